//! Fixed routing table between wire method names and handler operations

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    ListResources,
    GetResource,
    ListPrompts,
    GetPrompt,
    ListTools,
    ExecuteTool,
}

const ROUTES: [(&str, Method); 7] = [
    ("initialize", Method::Initialize),
    ("listResources", Method::ListResources),
    ("getResource", Method::GetResource),
    ("listPrompts", Method::ListPrompts),
    ("getPrompt", Method::GetPrompt),
    ("listTools", Method::ListTools),
    ("executeTool", Method::ExecuteTool),
];

impl Method {
    pub fn resolve(name: &str) -> Option<Self> {
        ROUTES
            .iter()
            .find(|(route, _)| *route == name)
            .map(|(_, method)| *method)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ListResources => "listResources",
            Self::GetResource => "getResource",
            Self::ListPrompts => "listPrompts",
            Self::GetPrompt => "getPrompt",
            Self::ListTools => "listTools",
            Self::ExecuteTool => "executeTool",
        }
    }

    /// Params that must be present before the handler is invoked. For the
    /// `get*`/`execute*` methods the first entry is the target identifier.
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Initialize => &["capabilities"],
            Self::GetResource => &["resourceId"],
            Self::GetPrompt => &["promptId"],
            Self::ExecuteTool => &["toolId"],
            Self::ListResources | Self::ListPrompts | Self::ListTools => &[],
        }
    }

    pub fn collection_key(self) -> Option<&'static str> {
        match self {
            Self::ListResources => Some("resources"),
            Self::ListPrompts => Some("prompts"),
            Self::ListTools => Some("tools"),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
