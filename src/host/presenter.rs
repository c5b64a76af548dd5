//! [`FramePresenter`] over a [`Host`]: a frame is a model, visible = displayed.

use crate::core::presenter::{FramePresenter, PresenterError};

use super::{Host, HostError, ModelId};

/// Owns the host on behalf of the player.
///
/// The viewer reaches the host through `host()`/`host_mut()` for opening
/// files and running commands.
pub struct HostPresenter<H: Host> {
    host: H,
}

impl<H: Host> HostPresenter<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn set_display(&mut self, id: ModelId, visible: bool) -> Result<(), PresenterError> {
        self.host.set_display(id, visible).map_err(|e| match e {
            HostError::ModelNotFound(id) => PresenterError::InvalidHandle(id.to_string()),
            other => PresenterError::Failed(other.to_string()),
        })
    }
}

impl<H: Host> FramePresenter for HostPresenter<H> {
    type Handle = ModelId;

    fn activate(&mut self, handle: &ModelId) -> Result<(), PresenterError> {
        self.set_display(*handle, true)
    }

    fn deactivate(&mut self, handle: &ModelId) -> Result<(), PresenterError> {
        self.set_display(*handle, false)
    }

    fn is_valid(&self, handle: &ModelId) -> bool {
        self.host.is_alive(*handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SceneHost;

    #[test]
    fn test_display_toggles_model() {
        let mut host = SceneHost::new();
        let id = host.add_model("frame_1");
        let mut presenter = HostPresenter::new(host);

        presenter.activate(&id).unwrap();
        assert_eq!(presenter.host().is_displayed(id), Some(true));
        presenter.deactivate(&id).unwrap();
        assert_eq!(presenter.host().is_displayed(id), Some(false));
    }

    #[test]
    fn test_deleted_model_is_invalid_handle() {
        let mut host = SceneHost::new();
        let id = host.add_model("frame_1");
        host.delete_model(id);
        let mut presenter = HostPresenter::new(host);

        assert!(!presenter.is_valid(&id));
        assert_eq!(
            presenter.activate(&id),
            Err(PresenterError::InvalidHandle("#1".into()))
        );
    }
}
