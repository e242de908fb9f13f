//! Supported REST paths.
//!
//! Every path the bridge answers is a variant here, so "unsupported path" is the
//! `None` arm of a parse rather than a string comparison scattered through handlers.

use std::fmt;

/// State-changing endpoints (`POST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandPath {
    Upscale,
    Interrogate,
    Txt2Img,
    Img2Img,
    /// Settings push from the client. Acknowledged, never queued.
    Options,
}

impl CommandPath {
    pub const ALL: [CommandPath; 5] = [
        CommandPath::Upscale,
        CommandPath::Interrogate,
        CommandPath::Txt2Img,
        CommandPath::Img2Img,
        CommandPath::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandPath::Upscale => "/sdapi/v1/extra-single-image/",
            CommandPath::Interrogate => "/sdapi/v1/interrogate",
            CommandPath::Txt2Img => "/sdapi/v1/txt2img",
            CommandPath::Img2Img => "/sdapi/v1/img2img",
            CommandPath::Options => "/sdapi/v1/options/",
        }
    }

    /// Exact match against the allow-list.
    pub fn parse(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == path)
    }

    /// Whether a POST to this path enters the blocking job flow.
    pub fn is_queued(self) -> bool {
        !matches!(self, CommandPath::Options)
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only endpoints (`GET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryPath {
    StartupEvents,
    Interrupt,
    Progress,
    Options,
    Upscalers,
    SdModels,
    Loras,
    Samplers,
    Schedulers,
    PromptStyles,
    Scripts,
    ControlNetVersion,
    ControlNetSettings,
    ControlNetModelList,
    ControlNetModuleList,
}

impl QueryPath {
    pub const ALL: [QueryPath; 15] = [
        QueryPath::StartupEvents,
        QueryPath::Interrupt,
        QueryPath::Progress,
        QueryPath::Options,
        QueryPath::Upscalers,
        QueryPath::SdModels,
        QueryPath::Loras,
        QueryPath::Samplers,
        QueryPath::Schedulers,
        QueryPath::PromptStyles,
        QueryPath::Scripts,
        QueryPath::ControlNetVersion,
        QueryPath::ControlNetSettings,
        QueryPath::ControlNetModelList,
        QueryPath::ControlNetModuleList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryPath::StartupEvents => "/startup-events",
            QueryPath::Interrupt => "/sdapi/v1/interrupt",
            QueryPath::Progress => "/sdapi/v1/progress",
            QueryPath::Options => "/sdapi/v1/options",
            QueryPath::Upscalers => "/sdapi/v1/upscalers",
            QueryPath::SdModels => "/sdapi/v1/sd-models",
            QueryPath::Loras => "/sdapi/v1/loras",
            QueryPath::Samplers => "/sdapi/v1/samplers",
            QueryPath::Schedulers => "/sdapi/v1/schedulers",
            QueryPath::PromptStyles => "/sdapi/v1/prompt-styles",
            QueryPath::Scripts => "/sdapi/v1/scripts",
            QueryPath::ControlNetVersion => "/controlnet/version",
            QueryPath::ControlNetSettings => "/controlnet/settings",
            QueryPath::ControlNetModelList => "/controlnet/model_list",
            QueryPath::ControlNetModuleList => "/controlnet/module_list",
        }
    }

    /// Match the path component only; callers strip the query string first.
    pub fn parse(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == path)
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_paths_are_exact() {
        assert_eq!(CommandPath::parse("/sdapi/v1/txt2img"), Some(CommandPath::Txt2Img));
        assert_eq!(
            CommandPath::parse("/sdapi/v1/extra-single-image/"),
            Some(CommandPath::Upscale)
        );
        // Trailing slash is part of the client's contract for this one
        assert_eq!(CommandPath::parse("/sdapi/v1/extra-single-image"), None);
        assert_eq!(CommandPath::parse("/sdapi/v1/nonexistent"), None);
    }

    #[test]
    fn test_options_is_not_queued() {
        assert!(!CommandPath::Options.is_queued());
        assert!(CommandPath::Img2Img.is_queued());
    }

    #[test]
    fn test_every_query_roundtrips() {
        for q in QueryPath::ALL {
            assert_eq!(QueryPath::parse(q.as_str()), Some(q));
        }
        // GET options has no trailing slash, POST options does
        assert_eq!(QueryPath::parse("/sdapi/v1/options/"), None);
    }
}
