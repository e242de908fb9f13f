//! Read-only GET answers. None of these touch the pending table.
//!
//! Most bodies are fixed shims: the client only needs the keys to exist so
//! its UI can populate, and real choices are made by the job definition.

use serde_json::{Value, json};

use crate::core::routes::QueryPath;
use crate::core::shared::BridgeShared;

/// Script names the client probes for when enabling UI features.
const SCRIPTS: [&str; 5] = ["extra options", "openoutpaint", "refiner", "sampler", "seed"];

pub fn answer(query: QueryPath, shared: &BridgeShared, skip_preview: bool) -> Value {
    match query {
        QueryPath::StartupEvents => json!({ "status": "ok" }),
        QueryPath::Interrupt => json!({ "hello": "ok" }),
        QueryPath::Progress => {
            serde_json::to_value(shared.progress().read(skip_preview)).unwrap_or_else(|_| json!({}))
        }
        QueryPath::Options => json!({
            "status": "ok",
            "sd_model_checkpoint": "",
            "sd_checkpoint_hash": "",
            "img2img_color_correction": false,
            "inpainting_mask_weight": 1.0,
        }),
        QueryPath::Upscalers => json!([{ "name": "None" }, { "name": "Lanczos" }]),
        QueryPath::SdModels => Value::Array(
            shared
                .catalog()
                .advertised_checkpoints()
                .into_iter()
                .map(|name| json!({ "title": name, "sha256": name }))
                .collect(),
        ),
        QueryPath::Loras => json!([{ "name": "Configure LoRAs in workflow" }]),
        QueryPath::Samplers => json!([{ "name": "Configure sampler in workflow" }]),
        QueryPath::Schedulers => json!([{ "name": "automatic", "label": "Automatic" }]),
        QueryPath::PromptStyles => {
            let styles: Vec<_> = shared.catalog().styles.into_values().collect();
            serde_json::to_value(styles).unwrap_or_else(|_| json!([]))
        }
        QueryPath::Scripts => json!({ "txt2img": SCRIPTS, "img2img": SCRIPTS }),
        QueryPath::ControlNetVersion => json!({ "version": 0 }),
        QueryPath::ControlNetSettings => json!({ "control_net_unit_count": 2 }),
        QueryPath::ControlNetModelList => json!({ "model_list": [] }),
        QueryPath::ControlNetModuleList => json!({
            "module_list": ["none", "inpaint"],
            "module_detail": {
                "none": { "model_free": false, "sliders": [] },
                "inpaint": { "model_free": false, "sliders": [] },
            },
        }),
    }
}
