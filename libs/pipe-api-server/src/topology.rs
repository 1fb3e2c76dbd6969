fn default_role() -> String {
    "LOCAL".into()
}

fn default_cloud_data_url() -> String {
    "http://cloud-server:8080".into()
}

fn default_topics() -> Vec<String> {
    vec!["price-topic".into()]
}

fn default_version() -> String {
    "1.0".into()
}

/// Что отдаёт `/registry/topology` подключающимся узлам.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TopologyConfig {
    /// Роль, назначаемая узлу.
    #[serde(default = "default_role")]
    pub role: String,
    /// Откуда узлу забирать данные.
    #[serde(default = "default_cloud_data_url")]
    pub cloud_data_url: String,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            cloud_data_url: default_cloud_data_url(),
            topics: default_topics(),
            version: default_version(),
        }
    }
}
