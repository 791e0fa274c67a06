use super::parsing::{
    env_flag, env_optional, env_or_default, parse_cors_origins, parse_environment, parse_i64,
    parse_score, parse_u16, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RedisSettings,
    RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings,
};

/// Options must allow at least a two-way choice.
const MIN_OPTIONS_PER_QUESTION: usize = 2;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMINA_HOST", "0.0.0.0");
        let port = env_or_default("EXAMINA_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMINA_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config = env_flag("EXAMINA_STRICT_CONFIG", false) || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examina API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examina");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examina_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let exam = ExamSettings {
            pass_threshold: parse_score(
                "EXAM_PASS_THRESHOLD",
                env_or_default("EXAM_PASS_THRESHOLD", "11"),
            )?,
            max_options_per_question: parse_usize(
                "EXAM_MAX_OPTIONS_PER_QUESTION",
                env_or_default("EXAM_MAX_OPTIONS_PER_QUESTION", "6"),
            )?,
            max_validity_days: parse_i64(
                "EXAM_MAX_VALIDITY_DAYS",
                env_or_default("EXAM_MAX_VALIDITY_DAYS", "730"),
            )?,
            allow_metadata_edits_with_attempts: env_flag(
                "EXAM_ALLOW_METADATA_EDITS_WITH_ATTEMPTS",
                true,
            ),
            auto_finalize: env_flag("EXAM_AUTO_FINALIZE", true),
            sweep_interval_seconds: parse_u64(
                "EXAM_SWEEP_INTERVAL_SECONDS",
                env_or_default("EXAM_SWEEP_INTERVAL_SECONDS", "60"),
            )?,
            attempt_start_rate_limit: parse_u64(
                "ATTEMPT_START_RATE_LIMIT",
                env_or_default("ATTEMPT_START_RATE_LIMIT", "10"),
            )?,
        };

        let log_level = env_or_default("EXAMINA_LOG_LEVEL", "info");
        let json = env_flag("EXAMINA_LOG_JSON", false);
        let prometheus_enabled = env_flag("PROMETHEUS_ENABLED", false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            exam,
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.max_options_per_question < MIN_OPTIONS_PER_QUESTION {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_MAX_OPTIONS_PER_QUESTION",
                value: self.exam.max_options_per_question.to_string(),
            });
        }

        if self.exam.max_validity_days <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_MAX_VALIDITY_DAYS",
                value: self.exam.max_validity_days.to_string(),
            });
        }

        if self.exam.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if env_optional("SECRET_KEY").is_none() {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }

        Ok(())
    }
}
