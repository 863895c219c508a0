use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use kpi_engine::{Handler, KpiKind, Router};
use mqtt_link::MqttConfig;

use crate::error::WorkerError;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Parser)]
#[command(name = "analytics-worker", about = "KPI analytics worker for the data bus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Подключиться к брокеру и обрабатывать KPI сообщения до Ctrl-C
    Serve(ServeArgs),
    /// Прогнать JSON-lines запись через маршруты и вывести результаты
    Replay(ReplayArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Путь к TOML конфиг файлу [по умолчанию: config.toml, необязателен]
    #[arg(long, env = "ANALYTICS_CONFIG")]
    pub config: Option<String>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<WorkerConfig, WorkerError> {
        WorkerConfig::load(self.config.as_deref())
    }
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Хост брокера
    #[arg(long, env = "ANALYTICS_BROKER_HOST")]
    pub host: Option<String>,

    /// Порт брокера
    #[arg(long, env = "ANALYTICS_BROKER_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "ANALYTICS_BROKER_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "ANALYTICS_BROKER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl ServeArgs {
    /// Значения CLI/env важнее файла.
    pub fn apply(&self, broker: &mut BrokerSection) {
        if let Some(host) = &self.host {
            broker.host = host.clone();
        }
        if let Some(port) = self.port {
            broker.port = port;
        }
        if let Some(username) = &self.username {
            broker.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            broker.password = Some(password.clone());
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// JSON-lines файл, по объекту `{"topic": ..., "payload": ...}` на строку
    pub input: String,
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    /// Привязки topic'ов. Пусто: встроенные маршруты `StandardKpis` и `Mean`.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    /// Очередь исходящих публикаций; сверх неё публикации отбрасываются.
    pub outbound_buffer: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: "ie-databus".into(),
            port: 1883,
            client_id: "data-analytics".into(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            reconnect_delay_ms: 2000,
            outbound_buffer: 1024,
        }
    }
}

impl BrokerSection {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            outbound_buffer: self.outbound_buffer,
            ..MqttConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub topic: String,
    pub kpi: KpiKind,
    /// По умолчанию result topic самого handler'а.
    #[serde(default)]
    pub result_topic: Option<String>,
}

impl WorkerConfig {
    /// Read `path`, or `config.toml` when `None`.
    ///
    /// Only the implicit default may be absent; it then yields the built-in
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, WorkerError> {
        let explicit = path.is_some();
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

        if !explicit && !Path::new(path).exists() {
            tracing::info!(config = %path, "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkerError::config("read", format!("'{path}': {e}")))?;
        let config = Self::parse(&content)
            .map_err(|e| WorkerError::config("parse", format!("'{path}': {e}")))?;
        tracing::info!(config = %path, "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.broker.port == 0 {
            return Err(WorkerError::config("broker", "port must be non-zero"));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(WorkerError::config("broker", "client_id must not be empty"));
        }
        for (i, route) in self.routes.iter().enumerate() {
            if route.topic.trim().is_empty() {
                return Err(WorkerError::config("routes", format!("route #{i} has an empty topic")));
            }
            if route.result_topic.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(WorkerError::config(
                    "routes",
                    format!("route '{}' has an empty result_topic", route.topic),
                ));
            }
        }
        Ok(())
    }

    pub fn build_router(&self) -> Router {
        if self.routes.is_empty() {
            return Router::with_defaults();
        }
        let mut router = Router::new();
        for route in &self.routes {
            router.register(
                route.topic.clone(),
                Handler::from_kind(route.kpi, route.result_topic.clone()),
            );
            tracing::info!(
                topic = %route.topic,
                kpi = ?route.kpi,
                result_topic = route.result_topic.as_deref().unwrap_or("default"),
                "registered route"
            );
        }
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = WorkerConfig::parse("").unwrap();
        assert_eq!(config.broker.host, "ie-databus");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.client_id, "data-analytics");
        assert!(config.broker.username.is_none());
        assert!(config.routes.is_empty());
        config.validate().unwrap();

        let router = config.build_router();
        assert_eq!(router.topics(), ["Mean", "StandardKpis"]);
        assert_eq!(router.result_topics(), ["MeanResult", "StandardKpiResult"]);
    }

    #[test]
    fn full_file() {
        let config = WorkerConfig::parse(
            r#"
            [broker]
            host = "10.0.0.5"
            port = 1884
            username = "edge"
            password = "edge"
            keep_alive_secs = 30
            reconnect_delay_ms = 500

            [[routes]]
            topic = "line1/kpis"
            kpi = "standard"

            [[routes]]
            topic = "line1/power"
            kpi = "power_mean"
            result_topic = "line1/power/result"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let mqtt = config.broker.to_mqtt_config();
        assert_eq!(mqtt.addr(), "10.0.0.5:1884");
        assert_eq!(mqtt.client_id, "data-analytics");
        assert_eq!(mqtt.username.as_deref(), Some("edge"));
        assert_eq!(mqtt.keep_alive, Duration::from_secs(30));
        assert_eq!(mqtt.reconnect_delay, Duration::from_millis(500));
        assert_eq!(mqtt.outbound_buffer, 1024);

        let router = config.build_router();
        assert_eq!(router.topics(), ["line1/kpis", "line1/power"]);
        assert_eq!(router.resolve("line1/kpis").unwrap().result_topic(), "StandardKpiResult");
        assert_eq!(router.resolve("line1/power").unwrap().result_topic(), "line1/power/result");
        assert!(router.resolve("Mean").is_err());
    }

    #[test]
    fn unknown_kpi_kind_is_rejected() {
        let err = WorkerConfig::parse(
            r#"
            [[routes]]
            topic = "t"
            kpi = "median"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("median"));
    }

    #[test]
    fn validation_failures() {
        let mut config = WorkerConfig::default();
        config.broker.port = 0;
        assert!(matches!(config.validate(), Err(WorkerError::Config { context: "broker", .. })));

        let mut config = WorkerConfig::default();
        config.broker.client_id = " ".into();
        assert!(config.validate().is_err());

        let config = WorkerConfig::parse(
            r#"
            [[routes]]
            topic = ""
            kpi = "standard"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(WorkerError::Config { context: "routes", .. })));
    }

    #[test]
    fn cli_overrides_file() {
        let mut broker = BrokerSection::default();
        let args = ServeArgs {
            config: ConfigArgs { config: None },
            host: Some("localhost".into()),
            port: Some(11883),
            username: None,
            password: Some("secret".into()),
        };
        args.apply(&mut broker);

        assert_eq!(broker.addr(), "localhost:11883");
        assert_eq!(broker.username, None);
        assert_eq!(broker.password.as_deref(), Some("secret"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = WorkerConfig::load(Some("/nonexistent/analytics.toml")).unwrap_err();
        assert!(matches!(err, WorkerError::Config { context: "read", .. }));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "analytics-worker",
            "serve",
            "--config",
            "worker.toml",
            "--host",
            "broker",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.config.config.as_deref(), Some("worker.toml"));
                assert_eq!(args.host.as_deref(), Some("broker"));
            }
            Commands::Replay(_) => panic!("expected serve"),
        }

        let cli = Cli::try_parse_from(["analytics-worker", "replay", "capture.jsonl"]).unwrap();
        assert!(matches!(cli.command, Commands::Replay(ref args) if args.input == "capture.jsonl"));
    }
}
