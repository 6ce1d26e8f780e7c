use std::path::PathBuf;

use onec_rdbg::{DebugTargetType, Endpoint};
use serde::Deserialize;

use crate::error::{DebugError, DebugResult};

/// Arguments of the `launch`/`attach` requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Infobase alias registered on the debug server.
    pub info_base: String,
    #[serde(default = "LaunchConfig::default_host")]
    pub debug_server_host: String,
    #[serde(default = "LaunchConfig::default_port")]
    pub debug_server_port: u16,
    #[serde(default)]
    pub root_project: Option<PathBuf>,
    #[serde(default)]
    pub extensions: Vec<PathBuf>,
    #[serde(default)]
    pub auto_attach_types: Vec<String>,
    /// The infobase is a local file store; a debug server must be started
    /// locally before connecting.
    #[serde(default)]
    pub file_info_base: bool,
    #[serde(default)]
    pub platform_path: Option<PathBuf>,
    #[serde(default)]
    pub platform_version: Option<String>,
}

impl LaunchConfig {
    fn default_host() -> String {
        "localhost".to_owned()
    }

    fn default_port() -> u16 {
        1550
    }

    pub fn from_value(value: serde_json::Value) -> DebugResult<Self> {
        let config: Self = serde_json::from_value(value).map_err(|err| {
            DebugError::InvalidRequest(crate::dap::codec::sanitize_json_error_message(
                &err.to_string(),
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> DebugResult<()> {
        if self.info_base.trim().is_empty() {
            return Err(DebugError::InvalidRequest(
                "infoBase must not be empty".to_string(),
            ));
        }
        if self.debug_server_host.trim().is_empty() {
            return Err(DebugError::InvalidRequest(
                "debugServerHost must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.debug_server_host.clone(),
            port: self.debug_server_port,
        }
    }

    /// Parses `autoAttachTypes`; unknown names are an error.
    pub fn auto_attach_kinds(&self) -> DebugResult<Vec<DebugTargetType>> {
        parse_target_types(&self.auto_attach_types)
    }
}

pub fn parse_target_types(names: &[String]) -> DebugResult<Vec<DebugTargetType>> {
    names
        .iter()
        .map(|name| {
            name.parse::<DebugTargetType>()
                .map_err(|err| DebugError::InvalidRequest(err.to_string()))
        })
        .collect()
}
