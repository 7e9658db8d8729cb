use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub enum BackendKind {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "yaml")]
    #[default]
    Yaml,
}

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,
    /// Data file holding modules, permissions and grants for the yaml backend
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

fn default_data_file() -> String {
    "config/grants.yaml".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            data_file: default_data_file(),
        }
    }
}

impl BackendSettings {
    pub fn memory() -> Self {
        Self {
            kind: BackendKind::Memory,
            data_file: default_data_file(),
        }
    }

    pub fn yaml(data_file: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Yaml,
            data_file: data_file.into(),
        }
    }
}
