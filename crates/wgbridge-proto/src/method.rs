//! Method-call envelope exchanged with the host shell

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names understood by the bridge
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const GET_STATS: &str = "getStats";
    pub const STAGE: &str = "stage";
    pub const CHECK_PERMISSION: &str = "checkPermission";
}

/// Argument keys carried inside `MethodCall::arguments`
pub mod arguments {
    pub const LOCALIZED_DESCRIPTION: &str = "localizedDescription";
    pub const WG_QUICK_CONFIG: &str = "wgQuickConfig";
    pub const TUNNEL_NAME: &str = "tunnelName";
}

/// A single command invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn without_arguments(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    /// Look up a named string argument
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// The arguments themselves, when the caller passed a bare string
    pub fn raw_string(&self) -> Option<&str> {
        self.arguments.as_str()
    }
}

/// Outcome of a method call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResult {
    pub fn success(value: impl Into<Value>) -> Self {
        MethodResult::Success {
            value: value.into(),
        }
    }

    pub fn success_null() -> Self {
        MethodResult::Success { value: Value::Null }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        MethodResult::Error {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success { .. })
    }

    /// Error code, if this is an error result
    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResult::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_argument_lookup() {
        let call = MethodCall::new(
            methods::INITIALIZE,
            json!({ "localizedDescription": "wg0" }),
        );
        assert_eq!(call.argument(arguments::LOCALIZED_DESCRIPTION), Some("wg0"));
        assert_eq!(call.argument(arguments::WG_QUICK_CONFIG), None);
        assert_eq!(call.raw_string(), None);
    }

    #[test]
    fn test_raw_string_arguments() {
        let call = MethodCall::new(methods::GET_STATS, json!("wg0"));
        assert_eq!(call.raw_string(), Some("wg0"));
    }

    #[test]
    fn test_missing_arguments_deserialize_as_null() {
        let call: MethodCall = serde_json::from_str(r#"{"method":"stop"}"#).unwrap();
        assert_eq!(call.method, methods::STOP);
        assert!(call.arguments.is_null());
    }

    #[test]
    fn test_result_tagging() {
        let json = serde_json::to_value(MethodResult::error("NOT_RUNNING", "Tunnel is not running"))
            .unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "NOT_RUNNING");
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(MethodResult::NotImplemented).unwrap();
        assert_eq!(json["status"], "not_implemented");
    }
}
