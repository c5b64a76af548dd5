//! REST API implementation using rouille.
//!
//! GET endpoints read [`SharedApiState`]; POST endpoints translate the
//! request into a [`Command`] and queue it for the control thread. A POST
//! answers as soon as the command is queued, not when it has run.

use log::{error, info};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, mpsc};
use std::thread;

use crate::commands::{Command, OnOff, parse_command};
use crate::viewer::ViewerStatus;

/// Shared state readable by API handlers (updated by the control thread)
#[derive(Default)]
pub struct SharedApiState {
    status: RwLock<ViewerStatus>,
}

impl SharedApiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: ViewerStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn snapshot(&self) -> ViewerStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Request body for loading files
#[derive(Debug, Deserialize)]
struct LoadRequest {
    paths: Vec<PathBuf>,
}

/// Request body for a raw command line
#[derive(Debug, Deserialize)]
struct CommandRequest {
    line: String,
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Self {
        Self { success: true, message: None, error: None }
    }

    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

/// REST API server
pub struct ApiServer {
    port: u16,
    state: Arc<SharedApiState>,
    command_tx: mpsc::Sender<Command>,
}

impl ApiServer {
    /// Start the server on a background thread, queueing commands into `tx`.
    pub fn start(port: u16, state: Arc<SharedApiState>, tx: mpsc::Sender<Command>) -> std::io::Result<()> {
        let server = ApiServer {
            port,
            state,
            command_tx: tx,
        };
        thread::Builder::new()
            .name("ames-api".to_string())
            .spawn(move || server.run())?;
        Ok(())
    }

    fn run(self) {
        let addr = format!("0.0.0.0:{}", self.port);
        let state = self.state;
        let tx = self.command_tx;

        match rouille::Server::new(&addr, move |request| Self::handle_request(request, &state, &tx)) {
            Ok(server) => {
                info!("API server listening on http://{}", addr);
                server.run();
            }
            Err(e) => error!("API server failed to bind {}: {}", addr, e),
        }
    }

    fn handle_request(request: &Request, state: &SharedApiState, tx: &mpsc::Sender<Command>) -> Response {
        // Handle preflight
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        // Paths with parameters are matched by prefix
        let path = request.url();
        if request.method() == "POST"
            && let Some(response) = Self::handle_param_post(&path, tx)
        {
            return response.with_additional_header("Access-Control-Allow-Origin", "*");
        }

        let response = rouille::router!(request,
            (GET) ["/api/status"] => {
                Response::json(&state.snapshot())
            },
            (GET) ["/api/health"] => {
                Response::json(&ApiResponse::ok_msg("ames API server"))
            },

            (POST) ["/api/align"] => {
                Self::send_command(tx, Command::Align { chain: None })
            },
            (POST) ["/api/play"] => {
                Self::send_command(tx, Command::Play { speed: None })
            },
            (POST) ["/api/stop"] => {
                Self::send_command(tx, Command::Stop)
            },
            (POST) ["/api/show"] => {
                Response::json(&ApiResponse::err("Missing frame number")).with_status_code(400)
            },
            (POST) ["/api/load"] => {
                Self::handle_load(request, tx)
            },
            (POST) ["/api/command"] => {
                Self::handle_command(request, tx)
            },

            _ => {
                Response::json(&ApiResponse::err("Not found")).with_status_code(404)
            }
        );

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn handle_param_post(path: &str, tx: &mpsc::Sender<Command>) -> Option<Response> {
        let bad = |msg: &str| Response::json(&ApiResponse::err(msg)).with_status_code(400);

        if let Some(chain) = path.strip_prefix("/api/align/") {
            if chain.is_empty() || !chain.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Some(bad("Invalid chain"));
            }
            return Some(Self::send_command(tx, Command::Align { chain: Some(chain.to_string()) }));
        }
        if let Some(frame) = path.strip_prefix("/api/show/") {
            return Some(match frame.parse::<i64>() {
                Ok(frame) => Self::send_command(tx, Command::Show { frame }),
                Err(_) => bad("Invalid frame number"),
            });
        }
        if let Some(fps) = path.strip_prefix("/api/play/") {
            return Some(match fps.parse::<u32>() {
                Ok(speed) if speed > 0 => Self::send_command(tx, Command::Play { speed: Some(speed) }),
                _ => bad("Invalid FPS value"),
            });
        }
        if let Some(state) = path.strip_prefix("/api/loop/") {
            let state = match state {
                "on" => OnOff::On,
                "off" => OnOff::Off,
                _ => return Some(bad("Expected on or off")),
            };
            return Some(Self::send_command(tx, Command::Loop { state }));
        }
        if let Some(n) = path.strip_prefix("/api/skip/") {
            return Some(match n.parse::<usize>() {
                Ok(n) => Self::send_command(tx, Command::Skip { n }),
                Err(_) => bad("Invalid skip"),
            });
        }
        None
    }

    fn send_command(tx: &mpsc::Sender<Command>, cmd: Command) -> Response {
        match tx.send(cmd) {
            Ok(_) => Response::json(&ApiResponse::ok()),
            Err(e) => Response::json(&ApiResponse::err(&format!("Failed to send command: {}", e)))
                .with_status_code(500),
        }
    }

    fn handle_load(request: &Request, tx: &mpsc::Sender<Command>) -> Response {
        match rouille::input::json_input::<LoadRequest>(request) {
            Ok(req) if req.paths.is_empty() => {
                Response::json(&ApiResponse::err("No paths given")).with_status_code(400)
            }
            Ok(req) => Self::send_command(tx, Command::Load { paths: req.paths }),
            Err(e) => Response::json(&ApiResponse::err(&format!("Invalid JSON: {}", e)))
                .with_status_code(400),
        }
    }

    fn handle_command(request: &Request, tx: &mpsc::Sender<Command>) -> Response {
        let req = match rouille::input::json_input::<CommandRequest>(request) {
            Ok(req) => req,
            Err(e) => {
                return Response::json(&ApiResponse::err(&format!("Invalid JSON: {}", e)))
                    .with_status_code(400);
            }
        };
        match parse_command(&req.line) {
            // Quitting is reserved for the local prompt
            Ok(Command::Quit) => {
                Response::json(&ApiResponse::err("quit is not available remotely")).with_status_code(403)
            }
            Ok(cmd) => Self::send_command(tx, cmd),
            Err(e) => Response::json(&ApiResponse::err(&e.to_string())).with_status_code(400),
        }
    }
}
