use super::errors::PoolError;
use std::str::FromStr;

pub const ENV_WORKERS: &str = "BOUNDED_POOL_WORKERS";
pub const ENV_MAX_PENDING: &str = "BOUNDED_POOL_MAX_PENDING";
pub const ENV_NAME: &str = "BOUNDED_POOL_NAME";

const DEFAULT_NAME: &str = "bounded-pool";

/// Конфигурация пула
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Количество слотов (одновременно выполняемых задач)
    pub max_workers: usize,
    /// Ограничение очереди ожидающих задач, `None` - без ограничения
    pub max_pending: Option<usize>,
    /// Имя пула для логов
    pub name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            max_pending: None,
            name: DEFAULT_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            max_workers: num_cpus,
            max_pending: Some(num_cpus * 10),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            max_workers: num_cpus::get() * 2, // Для I/O-bound задач
            max_pending: None,
            ..Default::default()
        }
    }

    pub fn max_pending(mut self, max_pending: Option<usize>) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_env() -> Result<Self, PoolError> {
        Self::default().env_overrides()
    }

    /// Переопределяет поля значениями из переменных окружения
    pub fn env_overrides(self) -> Result<Self, PoolError> {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = lookup(ENV_WORKERS) {
            self.max_workers = parse_value(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PENDING) {
            self.max_pending = match raw.to_lowercase().as_str() {
                "0" | "off" | "none" => None,
                _ => Some(parse_value(ENV_MAX_PENDING, &raw)?),
            };
        }
        if let Some(name) = lookup(ENV_NAME) {
            self.name = name;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_workers < 1 {
            return Err(PoolError::configuration(format!(
                "max_workers must be at least 1, got {}",
                self.max_workers
            )));
        }
        if self.max_pending == Some(0) {
            return Err(PoolError::configuration("max_pending must be positive when set"));
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, PoolError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| PoolError::configuration(format!("failed to parse {key}='{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_env_overrides(lookup(&[
                (ENV_WORKERS, "3"),
                (ENV_MAX_PENDING, "64"),
                (ENV_NAME, " demo "),
            ]))
            .unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.max_pending, Some(64));
        assert_eq!(config.name, "demo");
    }

    #[test]
    fn test_env_unbounded_pending() {
        let config = Config::cpu_bound()
            .with_env_overrides(lookup(&[(ENV_MAX_PENDING, "off")]))
            .unwrap();
        assert_eq!(config.max_pending, None);
    }

    #[test]
    fn test_env_invalid_values() {
        let err = Config::default()
            .with_env_overrides(lookup(&[(ENV_WORKERS, "many")]))
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(msg) if msg.contains(ENV_WORKERS)));

        let err = Config::default()
            .with_env_overrides(lookup(&[(ENV_WORKERS, "0")]))
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[test]
    fn test_validate() {
        assert!(Config::with_workers(1).validate().is_ok());
        assert!(Config::with_workers(0).validate().is_err());
        assert!(Config::with_workers(2).max_pending(Some(0)).validate().is_err());
    }
}
