//! Typed views of command payloads and their replies.
//!
//! The client sends numbers as either JSON numbers or strings (`"seed": "-1"`),
//! so numeric fields go through the lenient helpers below.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::{BridgeError, Result};
use super::routes::CommandPath;

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    match Number::deserialize(d)? {
        Number::Int(v) => Ok(v),
        Number::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
        Number::Float(v) => Err(serde::de::Error::custom(format!("not an integer: {v}"))),
        Number::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("not an integer: {s:?}"))),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    match Number::deserialize(d)? {
        Number::Int(v) => Ok(v as f64),
        Number::Float(v) => Ok(v),
        Number::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {s:?}"))),
    }
}

/// `POST /sdapi/v1/txt2img`
#[derive(Debug, Clone, Deserialize)]
pub struct Txt2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub width: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub height: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub seed: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub steps: i64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cfg_scale: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub batch_size: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub n_iter: i64,
    #[serde(default)]
    pub styles: Vec<String>,
}

/// `POST /sdapi/v1/img2img`
#[derive(Debug, Clone, Deserialize)]
pub struct Img2ImgParams {
    pub init_images: Vec<String>,
    pub mask: String,
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub width: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub height: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub seed: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub steps: i64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cfg_scale: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub denoising_strength: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub mask_blur: i64,
    /// Absent when the client's txt2img tool falls back to img2img
    #[serde(default, deserialize_with = "lenient_f64")]
    pub image_cfg_scale: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub batch_size: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub n_iter: i64,
    #[serde(default)]
    pub styles: Vec<String>,
}

impl Img2ImgParams {
    pub fn init_image(&self) -> Result<&str> {
        self.init_images
            .first()
            .map(String::as_str)
            .ok_or_else(|| BridgeError::MalformedPayload("init_images is empty".into()))
    }
}

/// `POST /sdapi/v1/extra-single-image/`
#[derive(Debug, Clone, Deserialize)]
pub struct UpscaleParams {
    pub image: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub upscaling_resize: f64,
    #[serde(default)]
    pub upscaler_1: Option<String>,
}

/// `POST /sdapi/v1/interrogate`
#[derive(Debug, Clone, Deserialize)]
pub struct InterrogateParams {
    pub image: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Decode `payload` into a typed view.
pub fn parse<'a, T: Deserialize<'a>>(payload: &'a Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}

/// Check that `payload` has the shape `command` needs before any job is queued.
pub fn validate(command: CommandPath, payload: &Value) -> Result<()> {
    match command {
        CommandPath::Txt2Img => parse::<Txt2ImgParams>(payload).map(|_| ()),
        CommandPath::Img2Img => parse::<Img2ImgParams>(payload)?.init_image().map(|_| ()),
        CommandPath::Upscale => parse::<UpscaleParams>(payload).map(|_| ()),
        CommandPath::Interrogate => parse::<InterrogateParams>(payload).map(|_| ()),
        CommandPath::Options => {
            if payload.is_object() {
                Ok(())
            } else {
                Err(BridgeError::MalformedPayload("options must be an object".into()))
            }
        }
    }
}

/// Reply to txt2img/img2img. `info` is itself JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesResponse {
    pub images: Vec<String>,
    pub info: String,
}

impl ImagesResponse {
    pub fn new(images: Vec<String>, seeds: &[i64]) -> Self {
        Self {
            images,
            info: serde_json::json!({ "all_seeds": seeds }).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleResponse {
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
}
