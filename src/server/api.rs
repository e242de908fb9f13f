//! REST handler and listener using rouille.
//!
//! # Purpose
//!
//! Serves the sdapi surface. GET paths are answered from shared state without
//! blocking. POST command paths are queued on the engine and the handler thread
//! parks until the engine finalizes the request.
//!
//! # Key types
//!
//! - [`Listener`] - bound rouille server running on its own thread
//! - [`ListenerContext`] - per-listener settings handed to every handler call
//! - [`handle_request`] - the routing function, usable without a socket via
//!   `rouille::Request::fake_http`
//!
//! # Thread safety
//!
//! - rouille spawns a thread per request, so a parked POST never stalls other calls
//! - Everything mutable lives in [`BridgeShared`] behind its own locks
//! - CORS headers are added to every response when enabled

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use log::{debug, error};
use rouille::{Request, Response};
use serde_json::{Value, json};

use super::debug::log_document;
use super::queries;
use crate::bridge::BridgeConfig;
use crate::core::error::{BridgeError, Result};
use crate::core::params;
use crate::core::routes::{CommandPath, QueryPath};
use crate::core::shared::BridgeShared;

/// Reply to the settings push, which is acknowledged and otherwise ignored
pub const OPTIONS_ACK: &str = "Options received";

/// Settings fixed for the lifetime of one listener.
pub struct ListenerContext {
    pub shared: Arc<BridgeShared>,
    pub cors: bool,
    pub verbose: bool,
    /// Actual bound port (differs from the config when it asked for 0)
    port: AtomicU16,
}

impl ListenerContext {
    pub fn new(config: &BridgeConfig, shared: Arc<BridgeShared>) -> Self {
        Self {
            shared,
            cors: config.cors,
            verbose: config.verbose,
            port: AtomicU16::new(config.port),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }
}

/// A bound rouille server polled on a background thread.
pub struct Listener {
    addr: SocketAddr,
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Bind synchronously, then hand the server to its polling thread.
    pub fn spawn(config: &BridgeConfig, shared: Arc<BridgeShared>) -> Result<Self> {
        let ctx = Arc::new(ListenerContext::new(config, shared));
        let handler_ctx = Arc::clone(&ctx);

        let server = rouille::Server::new((config.address.as_str(), config.port), move |request| {
            handle_request(request, &handler_ctx)
        })
        .map_err(|e| BridgeError::Bind {
            addr: format!("{}:{}", config.address, config.port),
            reason: e.to_string(),
        })?;

        let addr = server.server_addr();
        ctx.port.store(addr.port(), Ordering::Relaxed);

        let (handle, stop_tx) = server.stoppable();
        Ok(Self { addr, stop_tx, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, drop the socket and join the polling thread.
    pub fn shutdown(self) {
        // Err only if the thread already exited
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("API listener thread on {} panicked", self.addr);
        }
    }
}

/// Route one request. Never panics on client input.
pub fn handle_request(request: &Request, ctx: &ListenerContext) -> Response {
    let response = match request.method() {
        "OPTIONS" => preflight(),
        "POST" => handle_command(request, ctx),
        "GET" => handle_query(request, ctx),
        other => {
            debug!("Unsupported method {} {}", other, request.url());
            error_response(&BridgeError::UnknownPath(request.url()))
        }
    };

    if ctx.cors { with_cors(response) } else { response }
}

/// Empty 200. Any headers come from CORS alone.
fn preflight() -> Response {
    Response::empty_204().with_status_code(200)
}

fn with_cors(response: Response) -> Response {
    response
        .with_additional_header("Access-Control-Allow-Origin", "*")
        .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .with_additional_header("Access-Control-Allow-Headers", "*")
}

fn error_response(err: &BridgeError) -> Response {
    Response::json(&json!({ "error": err.to_string() })).with_status_code(err.status_code())
}

fn handle_command(request: &Request, ctx: &ListenerContext) -> Response {
    let url = request.url();
    debug!("POST {}", url);

    let Some(command) = CommandPath::parse(&url) else {
        return error_response(&BridgeError::UnknownPath(url));
    };

    match run_command(request, command, ctx) {
        Ok(output) => {
            if ctx.verbose {
                log_document(&format!("POST {} response", command), &output);
            }
            Response::json(&output)
        }
        Err(e) => {
            debug!("POST {} failed: {}", command, e);
            error_response(&e)
        }
    }
}

fn run_command(request: &Request, command: CommandPath, ctx: &ListenerContext) -> Result<Value> {
    let payload = read_json_body(request)?;
    if ctx.verbose {
        log_document(&format!("POST {}", command), &payload);
    }
    params::validate(command, &payload)?;

    if !command.is_queued() {
        return Ok(json!({ "status": OPTIONS_ACK }));
    }
    ctx.shared.execute(command, payload, ctx.port())
}

fn read_json_body(request: &Request) -> Result<Value> {
    let mut body = Vec::new();
    if let Some(mut data) = request.data() {
        data.read_to_end(&mut body)
            .map_err(|e| BridgeError::MalformedPayload(format!("could not read body: {}", e)))?;
    }
    if body.is_empty() {
        return Err(BridgeError::MalformedPayload("empty body".into()));
    }
    Ok(serde_json::from_slice(&body)?)
}

fn handle_query(request: &Request, ctx: &ListenerContext) -> Response {
    let url = request.url();
    debug!("GET {}", url);

    let Some(query) = QueryPath::parse(&url) else {
        return error_response(&BridgeError::UnknownPath(url));
    };

    // Anything but an explicit "false" skips the preview
    let skip_preview = request
        .get_param("skip_current_image")
        .is_some_and(|v| !v.eq_ignore_ascii_case("false"));

    let body = queries::answer(query, &ctx.shared, skip_preview);
    if ctx.verbose {
        log_document(&format!("GET {}", query), &body);
    }
    Response::json(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::{ChannelDispatcher, JobSubmission};
    use crossbeam_channel::Receiver;
    use std::thread;
    use std::time::Duration;

    fn context(cors: bool) -> (Arc<ListenerContext>, Receiver<JobSubmission>) {
        let (dispatcher, rx) = ChannelDispatcher::new();
        let shared = Arc::new(BridgeShared::new(Arc::new(dispatcher)));
        let config = BridgeConfig { cors, port: 7861, ..BridgeConfig::default() };
        (Arc::new(ListenerContext::new(&config, shared)), rx)
    }

    fn body_of(response: Response) -> Value {
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut raw = String::new();
        reader.read_to_string(&mut raw).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    fn post(path: &str, body: &Value) -> Request {
        Request::fake_http(
            "POST",
            path,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            body.to_string().into_bytes(),
        )
    }

    fn get(path: &str) -> Request {
        Request::fake_http("GET", path, vec![], vec![])
    }

    fn txt2img_body() -> Value {
        json!({
            "prompt": "harbour at dusk", "negative_prompt": "", "seed": "-1",
            "cfg_scale": 7, "steps": 20, "batch_size": 1, "width": 64, "height": 64, "n_iter": 2
        })
    }

    #[test]
    fn test_unknown_get_is_404() {
        let (ctx, _rx) = context(false);
        let response = handle_request(&get("/sdapi/v1/nonexistent"), &ctx);
        assert_eq!(response.status_code, 404);
        assert_eq!(body_of(response), json!({"error": "Command not found"}));
    }

    #[test]
    fn test_unknown_post_is_404() {
        let (ctx, rx) = context(false);
        let response = handle_request(&post("/sdapi/v1/nonexistent", &json!({})), &ctx);
        assert_eq!(response.status_code, 404);
        assert_eq!(body_of(response), json!({"error": "Command not found"}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_options_post_acknowledged_without_queueing() {
        let (ctx, rx) = context(false);
        let response = handle_request(
            &post("/sdapi/v1/options/", &json!({"sd_model_checkpoint": "foo"})),
            &ctx,
        );
        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Content-Type"), Some("application/json"));
        assert_eq!(body_of(response), json!({"status": OPTIONS_ACK}));
        assert!(ctx.shared.pending().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_json_is_400() {
        let (ctx, _rx) = context(false);
        let request = Request::fake_http("POST", "/sdapi/v1/txt2img", vec![], b"{not json".to_vec());
        let response = handle_request(&request, &ctx);
        assert_eq!(response.status_code, 400);
        assert!(ctx.shared.pending().is_empty());
    }

    #[test]
    fn test_missing_field_is_400_and_not_queued() {
        let (ctx, rx) = context(false);
        let response = handle_request(&post("/sdapi/v1/interrogate", &json!({"model": "clip"})), &ctx);
        assert_eq!(response.status_code, 400);
        let body = body_of(response);
        assert!(body["error"].as_str().unwrap().contains("image"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_txt2img_blocks_until_finalized() {
        let (ctx, rx) = context(false);
        let handler = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || handle_request(&post("/sdapi/v1/txt2img", &txt2img_body()), &ctx))
        };

        let job = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(job.bridge_port, 7861);
        assert_eq!(ctx.shared.pending().ids(), vec![job.request_id]);
        assert!(rx.try_recv().is_err(), "dispatched exactly once");

        let request = ctx.shared.checkout(job.request_id).unwrap();
        assert!(request.is_command(CommandPath::Txt2Img));
        assert!(!handler.is_finished(), "handler must be parked");

        let output = json!({"images": ["iVBORw0KGgo="], "info": "{\"all_seeds\": [1, 2]}"});
        ctx.shared.finalize(job.request_id, output.clone()).unwrap();

        let response = handler.join().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(body_of(response), output);
        assert!(ctx.shared.pending().is_empty());
    }

    #[test]
    fn test_progress_idle() {
        let (ctx, _rx) = context(false);
        let response = handle_request(&get("/sdapi/v1/progress?skip_current_image=false"), &ctx);
        assert_eq!(response.status_code, 200);
        assert_eq!(
            body_of(response),
            json!({"progress": 0.0, "eta_relative": 0.0, "current_image": null})
        );
    }

    #[test]
    fn test_progress_skip_flag() {
        let (ctx, _rx) = context(false);
        ctx.shared.progress().record_progress(3.0, 4.0);
        ctx.shared
            .progress()
            .record_preview(image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4)));

        let with = body_of(handle_request(&get("/sdapi/v1/progress"), &ctx));
        assert_eq!(with["progress"], json!(0.75));
        assert!(with["current_image"].is_string());

        let without = body_of(handle_request(&get("/sdapi/v1/progress?skip_current_image=true"), &ctx));
        assert!(without["current_image"].is_null());
    }

    #[test]
    fn test_cors_headers_when_enabled() {
        let (ctx, _rx) = context(true);
        let preflight = handle_request(&Request::fake_http("OPTIONS", "/sdapi/v1/txt2img", vec![], vec![]), &ctx);
        assert_eq!(preflight.status_code, 200);
        assert_eq!(header(&preflight, "Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(header(&preflight, "Access-Control-Allow-Methods"), Some("GET, POST, OPTIONS"));

        let missing = handle_request(&get("/nope"), &ctx);
        assert_eq!(header(&missing, "Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_no_cors_headers_when_disabled() {
        let (ctx, _rx) = context(false);
        let preflight = handle_request(&Request::fake_http("OPTIONS", "/", vec![], vec![]), &ctx);
        assert_eq!(preflight.status_code, 200);
        assert!(preflight.headers.is_empty(), "got {:?}", preflight.headers);
        let ok = handle_request(&get("/startup-events"), &ctx);
        assert_eq!(header(&ok, "Access-Control-Allow-Origin"), None);
    }
}
