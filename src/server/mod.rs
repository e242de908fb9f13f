//! sdapi-compatible REST listener.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   JobSubmission    ┌─────────────────────┐
//! │  rouille handler thread  │  ── dispatcher ──▶ │  execution engine   │
//! │  POST /sdapi/v1/txt2img  │                    │  (own thread)       │
//! │    parks on latch ...    │                    │                     │
//! │                          │ ◀── finalize(id) ──│  checkout(id), run  │
//! └──────────────────────────┘                    └─────────────────────┘
//!          │  GET /sdapi/v1/progress                      │
//!          │◀────────── ProgressTracker ◀─────────────────│ progress/preview
//! ```
//!
//! - **rouille** - sync HTTP server, one thread per request
//! - **BridgeShared** - pending table, progress and catalog shared with the engine
//!
//! # Endpoints
//!
//! | Method | Path                             | Description                  |
//! |--------|----------------------------------|------------------------------|
//! | POST   | `/sdapi/v1/txt2img`              | Generate, blocks until done  |
//! | POST   | `/sdapi/v1/img2img`              | Inpaint/outpaint, blocks     |
//! | POST   | `/sdapi/v1/extra-single-image/`  | Upscale, blocks              |
//! | POST   | `/sdapi/v1/interrogate`          | Caption, blocks              |
//! | POST   | `/sdapi/v1/options/`             | Acknowledged, not queued     |
//! | GET    | `/sdapi/v1/progress`             | Ratio, ETA, optional preview |
//! | GET    | `/sdapi/v1/{sd-models,...}`      | Discovery shims              |
//! | GET    | `/controlnet/*`                  | Extension shims              |
//! | OPTIONS| any                              | CORS preflight               |

mod api;
mod debug;
mod queries;

pub use api::{Listener, ListenerContext, OPTIONS_ACK, handle_request};
pub use queries::answer;
