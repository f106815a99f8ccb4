use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SlingshotConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub persistence: PersistenceConfig,
    pub gesture: GestureConfig,
    pub layout: LayoutConfig,
    pub transport: TransportConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Largest websocket message accepted (selfies travel inline as base64)
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Optional absolute prefix for locally stored image URLs (e.g. "http://hub:3001")
    pub public_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory for locally stored images, served under /uploads
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Object storage backend, tried before local disk when complete
    pub object: Option<ObjectStorageConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ObjectStorageConfig {
    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_object_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    /// Custom S3-compatible endpoint; path-style addressing is used when set
    pub endpoint: Option<String>,

    /// Key prefix for uploaded objects
    #[serde(default = "default_object_key_prefix")]
    pub key_prefix: String,
}

impl ObjectStorageConfig {
    /// Credentials and bucket are all present
    pub fn is_complete(&self) -> bool {
        !self.bucket.trim().is_empty()
            && !self.access_key_id.trim().is_empty()
            && !self.secret_access_key.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersistenceConfig {
    /// Directory holding one JSON document per message record
    #[serde(default = "default_persistence_path")]
    pub path: String,

    /// Keep records in memory only
    #[serde(default)]
    pub ephemeral: bool,
}

/// Gesture detection strategy
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GesturePolicy {
    /// Pull back then release along a single axis within a hold window
    Directional,
    /// Angular velocity spike combined with acceleration magnitude
    AngularVelocity,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GestureConfig {
    #[serde(default = "default_gesture_policy")]
    pub policy: GesturePolicy,

    /// Reference axis for the directional policy
    #[serde(default = "default_gesture_axis")]
    pub axis: Axis,

    /// Axis acceleration below this starts charging (m/s²)
    #[serde(default = "default_pull_back_threshold")]
    pub pull_back_threshold: f64,

    /// Axis acceleration above this releases the shot (m/s²)
    #[serde(default = "default_release_threshold")]
    pub release_threshold: f64,

    /// Minimum acceleration magnitude of the releasing sample
    #[serde(default = "default_release_min_magnitude")]
    pub release_min_magnitude: f64,

    /// Angular velocity trigger for the angular policy (degrees per second)
    #[serde(default = "default_angular_velocity_threshold")]
    pub angular_velocity_threshold: f64,

    /// Magnitude trigger for the angular policy (m/s²)
    #[serde(default = "default_magnitude_threshold")]
    pub magnitude_threshold: f64,

    /// Longest allowed pull-back to release interval
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,

    /// Minimum interval between two shots
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Divisor turning release magnitude into force
    #[serde(default = "default_normalization_factor")]
    pub normalization_factor: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LayoutConfig {
    /// Maximum number of visible items
    #[serde(default = "default_layout_capacity")]
    pub capacity: usize,

    /// Required spacing between randomly placed items (percent of canvas)
    #[serde(default = "default_min_distance_percent")]
    pub min_distance_percent: f64,

    /// Spacing accepted by the grid fallback
    #[serde(default = "default_relaxed_distance_percent")]
    pub relaxed_distance_percent: f64,

    /// Random draws before falling back to the grid
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_grid_cols")]
    pub grid_cols: u32,

    #[serde(default = "default_grid_rows")]
    pub grid_rows: u32,

    /// Total jitter width applied to grid cell centers
    #[serde(default = "default_grid_jitter")]
    pub grid_jitter: f64,

    /// Horizontal range for random draws (start, end)
    #[serde(default = "default_random_x")]
    pub random_x: (f64, f64),

    /// Vertical range for random draws (start, end)
    #[serde(default = "default_random_y")]
    pub random_y: (f64, f64),

    /// Horizontal extent of the fallback grid (start, end)
    #[serde(default = "default_grid_x")]
    pub grid_x: (f64, f64),

    /// Vertical extent of the fallback grid (start, end)
    #[serde(default = "default_grid_y")]
    pub grid_y: (f64, f64),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Hub websocket URL
    #[serde(default = "default_transport_url")]
    pub url: String,

    /// Fixed delay between reconnection attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Reconnection attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Timeout for a single connection attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SlingshotConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("slingshot.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default(
                "server.max_message_bytes",
                default_max_message_bytes() as i64,
            )?
            .set_default("storage.local_path", default_local_path())?
            .set_default("persistence.path", default_persistence_path())?
            .set_default("persistence.ephemeral", false)?
            .set_default("gesture.policy", "directional")?
            .set_default("gesture.axis", "y")?
            .set_default("gesture.pull_back_threshold", default_pull_back_threshold())?
            .set_default("gesture.release_threshold", default_release_threshold())?
            .set_default(
                "gesture.release_min_magnitude",
                default_release_min_magnitude(),
            )?
            .set_default(
                "gesture.angular_velocity_threshold",
                default_angular_velocity_threshold(),
            )?
            .set_default("gesture.magnitude_threshold", default_magnitude_threshold())?
            .set_default("gesture.max_hold_ms", default_max_hold_ms() as i64)?
            .set_default("gesture.cooldown_ms", default_cooldown_ms() as i64)?
            .set_default(
                "gesture.normalization_factor",
                default_normalization_factor(),
            )?
            .set_default("layout.capacity", default_layout_capacity() as i64)?
            .set_default(
                "layout.min_distance_percent",
                default_min_distance_percent(),
            )?
            .set_default(
                "layout.relaxed_distance_percent",
                default_relaxed_distance_percent(),
            )?
            .set_default("layout.max_attempts", default_max_attempts())?
            .set_default("layout.grid_cols", default_grid_cols())?
            .set_default("layout.grid_rows", default_grid_rows())?
            .set_default("layout.grid_jitter", default_grid_jitter())?
            .set_default(
                "layout.random_x",
                vec![default_random_x().0, default_random_x().1],
            )?
            .set_default(
                "layout.random_y",
                vec![default_random_y().0, default_random_y().1],
            )?
            .set_default("layout.grid_x", vec![default_grid_x().0, default_grid_x().1])?
            .set_default("layout.grid_y", vec![default_grid_y().0, default_grid_y().1])?
            .set_default("transport.url", default_transport_url())?
            .set_default(
                "transport.reconnect_delay_ms",
                default_reconnect_delay_ms() as i64,
            )?
            .set_default(
                "transport.max_reconnect_attempts",
                default_max_reconnect_attempts(),
            )?
            .set_default(
                "transport.connect_timeout_ms",
                default_connect_timeout_ms() as i64,
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. SLINGSHOT_SERVER__PORT=9090
            .add_source(
                Environment::with_prefix("SLINGSHOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: SlingshotConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Copy of the configuration safe to log
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let Some(object) = config.storage.object.as_mut() {
            if !object.secret_access_key.is_empty() {
                object.secret_access_key = "<redacted>".to_string();
            }
        }
        config
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_message_bytes == 0 {
            return Err(ConfigError::Message(
                "Server max_message_bytes must be greater than 0".to_string(),
            ));
        }

        if self.storage.local_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage local_path must not be empty".to_string(),
            ));
        }

        if !self.persistence.ephemeral && self.persistence.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Persistence path must not be empty unless ephemeral".to_string(),
            ));
        }

        self.validate_gesture()?;
        self.validate_layout()?;

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_gesture(&self) -> Result<(), ConfigError> {
        let gesture = &self.gesture;

        if gesture.cooldown_ms == 0 {
            return Err(ConfigError::Message(
                "Gesture cooldown_ms must be greater than 0".to_string(),
            ));
        }

        if !(gesture.normalization_factor > 0.0) {
            return Err(ConfigError::Message(
                "Gesture normalization_factor must be positive".to_string(),
            ));
        }

        if gesture.policy == GesturePolicy::Directional {
            if gesture.max_hold_ms == 0 {
                return Err(ConfigError::Message(
                    "Gesture max_hold_ms must be greater than 0".to_string(),
                ));
            }
            if gesture.pull_back_threshold >= gesture.release_threshold {
                return Err(ConfigError::Message(
                    "Gesture pull_back_threshold must be below release_threshold".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_layout(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;

        if layout.capacity == 0 {
            return Err(ConfigError::Message(
                "Layout capacity must be greater than 0".to_string(),
            ));
        }

        if !(layout.min_distance_percent > 0.0) || !(layout.relaxed_distance_percent >= 0.0) {
            return Err(ConfigError::Message(
                "Layout distances must be positive".to_string(),
            ));
        }

        if layout.max_attempts == 0 || layout.grid_cols == 0 || layout.grid_rows == 0 {
            return Err(ConfigError::Message(
                "Layout max_attempts and grid dimensions must be greater than 0".to_string(),
            ));
        }

        for (name, (start, end)) in [
            ("random_x", layout.random_x),
            ("random_y", layout.random_y),
            ("grid_x", layout.grid_x),
            ("grid_y", layout.grid_y),
        ] {
            if !(start < end) || start < 0.0 || end > 100.0 {
                return Err(ConfigError::Message(format!(
                    "Layout {} must be an increasing range within 0..=100",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl Default for SlingshotConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig {
                local_path: default_local_path(),
                object: None,
            },
            persistence: PersistenceConfig {
                path: default_persistence_path(),
                ephemeral: false,
            },
            gesture: GestureConfig::default(),
            layout: LayoutConfig::default(),
            transport: TransportConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            max_message_bytes: default_max_message_bytes(),
            public_base_url: None,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            policy: default_gesture_policy(),
            axis: default_gesture_axis(),
            pull_back_threshold: default_pull_back_threshold(),
            release_threshold: default_release_threshold(),
            release_min_magnitude: default_release_min_magnitude(),
            angular_velocity_threshold: default_angular_velocity_threshold(),
            magnitude_threshold: default_magnitude_threshold(),
            max_hold_ms: default_max_hold_ms(),
            cooldown_ms: default_cooldown_ms(),
            normalization_factor: default_normalization_factor(),
        }
    }
}

impl GestureConfig {
    /// Defaults for the angular velocity policy
    pub fn angular_velocity() -> Self {
        Self {
            policy: GesturePolicy::AngularVelocity,
            ..Self::default()
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            capacity: default_layout_capacity(),
            min_distance_percent: default_min_distance_percent(),
            relaxed_distance_percent: default_relaxed_distance_percent(),
            max_attempts: default_max_attempts(),
            grid_cols: default_grid_cols(),
            grid_rows: default_grid_rows(),
            grid_jitter: default_grid_jitter(),
            random_x: default_random_x(),
            random_y: default_random_y(),
            grid_x: default_grid_x(),
            grid_y: default_grid_y(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_transport_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    3001
}
fn default_max_message_bytes() -> usize {
    50_000_000
}

fn default_local_path() -> String {
    "./uploads".to_string()
}
fn default_object_region() -> String {
    "us-east-1".to_string()
}
fn default_object_key_prefix() -> String {
    "messages".to_string()
}

fn default_persistence_path() -> String {
    "./data/messages".to_string()
}

fn default_gesture_policy() -> GesturePolicy {
    GesturePolicy::Directional
}
fn default_gesture_axis() -> Axis {
    Axis::Y
}
fn default_pull_back_threshold() -> f64 {
    -7.0
}
fn default_release_threshold() -> f64 {
    5.0
}
fn default_release_min_magnitude() -> f64 {
    0.0
}
fn default_angular_velocity_threshold() -> f64 {
    200.0
}
fn default_magnitude_threshold() -> f64 {
    15.0
}
fn default_max_hold_ms() -> u64 {
    800
}
fn default_cooldown_ms() -> u64 {
    1000
}
fn default_normalization_factor() -> f64 {
    10.0
}

fn default_layout_capacity() -> usize {
    15
}
fn default_min_distance_percent() -> f64 {
    25.0
}
fn default_relaxed_distance_percent() -> f64 {
    20.0
}
fn default_max_attempts() -> u32 {
    100
}
fn default_grid_cols() -> u32 {
    5
}
fn default_grid_rows() -> u32 {
    4
}
fn default_grid_jitter() -> f64 {
    5.0
}
fn default_random_x() -> (f64, f64) {
    (5.0, 90.0)
}
fn default_random_y() -> (f64, f64) {
    (10.0, 90.0)
}
fn default_grid_x() -> (f64, f64) {
    (10.0, 90.0)
}
fn default_grid_y() -> (f64, f64) {
    (15.0, 85.0)
}

fn default_transport_url() -> String {
    "ws://127.0.0.1:3001/ws".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SlingshotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gesture.policy, GesturePolicy::Directional);
        assert_eq!(config.layout.capacity, 15);
        assert!(config.storage.object.is_none());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 4100

[gesture]
policy = "angular_velocity"
cooldown_ms = 1500

[storage.object]
bucket = "shots"
access_key_id = "AKID"
secret_access_key = "secret"
"#
        )
        .unwrap();

        let config = SlingshotConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.gesture.policy, GesturePolicy::AngularVelocity);
        assert_eq!(config.gesture.cooldown_ms, 1500);
        assert_eq!(config.gesture.max_hold_ms, 800);

        let object = config.storage.object.as_ref().unwrap();
        assert!(object.is_complete());
        assert_eq!(object.region, "us-east-1");
        assert_eq!(object.key_prefix, "messages");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_incomplete_object_storage() {
        let object = ObjectStorageConfig {
            bucket: "shots".to_string(),
            region: default_object_region(),
            access_key_id: String::new(),
            secret_access_key: "secret".to_string(),
            endpoint: None,
            key_prefix: default_object_key_prefix(),
        };
        assert!(!object.is_complete());
    }

    #[test]
    fn test_redacted_hides_secret() {
        let mut config = SlingshotConfig::default();
        config.storage.object = Some(ObjectStorageConfig {
            bucket: "shots".to_string(),
            region: default_object_region(),
            access_key_id: "AKID".to_string(),
            secret_access_key: "hunter2".to_string(),
            endpoint: None,
            key_prefix: default_object_key_prefix(),
        });

        let redacted = config.redacted();
        let object = redacted.storage.object.unwrap();
        assert_eq!(object.secret_access_key, "<redacted>");
        assert_eq!(object.access_key_id, "AKID");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SlingshotConfig::default();

        config.layout.capacity = 0;
        assert!(config.validate().is_err());
        config.layout.capacity = 20;
        assert!(config.validate().is_ok());

        config.gesture.pull_back_threshold = 6.0;
        assert!(config.validate().is_err());
        config.gesture.pull_back_threshold = -8.0;
        assert!(config.validate().is_ok());

        config.layout.random_x = (90.0, 5.0);
        assert!(config.validate().is_err());
        config.layout.random_x = (5.0, 90.0);

        config.gesture.normalization_factor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&SlingshotConfig::default()).unwrap();
        assert!(rendered.contains("[gesture]"));
        assert!(rendered.contains("policy = \"directional\""));
    }
}
