//! Frame presenter seam - the host side of "exactly one frame visible".
//!
//! The player never touches the scene directly. It asks a presenter to make a
//! frame visible or hidden and to report whether a handle still exists
//! (models can be closed by the user behind the player's back).

use std::fmt;

/// Presenter failures
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterError {
    /// Handle no longer refers to anything in the host (externally deleted)
    InvalidHandle(String),
    /// Host refused or failed the visibility change
    Failed(String),
}

impl fmt::Display for PresenterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenterError::InvalidHandle(h) => write!(f, "Invalid frame handle: {}", h),
            PresenterError::Failed(msg) => write!(f, "Presenter failed: {}", msg),
        }
    }
}

impl std::error::Error for PresenterError {}

/// Make-visible / make-invisible side effects for opaque frame handles.
///
/// Contract: a correct caller never activates two handles without
/// deactivating the previous one in between.
pub trait FramePresenter {
    /// Opaque frame handle (model id, scene node, ...)
    type Handle: Clone + PartialEq + fmt::Debug;

    fn activate(&mut self, handle: &Self::Handle) -> Result<(), PresenterError>;

    fn deactivate(&mut self, handle: &Self::Handle) -> Result<(), PresenterError>;

    /// False once the host has dropped the object behind `handle`.
    fn is_valid(&self, handle: &Self::Handle) -> bool;
}
