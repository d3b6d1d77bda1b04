use clap::{Parser, ValueEnum};
use replication_group::elasticache::AwsSettings;
use replication_group::util::telemetry::LogFormat;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Kubernetes operator for ElastiCache replication groups
#[derive(Parser, Debug)]
#[command(name = "operator", version, about)]
pub struct OperatorConfig {
    /// AWS region, falls back to AWS_DEFAULT_REGION and then the AWS config files
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Named AWS profile from the shared config files
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Maximum attempts for a throttled or failed ElastiCache request
    #[arg(long, env = "AWS_MAX_ATTEMPTS", default_value = "11")]
    pub max_retries: u32,

    /// Address of the health and metrics server
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_address: String,

    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: LogFormatArg,
}

impl OperatorConfig {
    pub fn aws_settings(&self) -> AwsSettings {
        AwsSettings {
            region: self
                .region
                .clone()
                .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok()),
            profile: self.profile.clone(),
            max_attempts: self.max_retries,
        }
    }
}
