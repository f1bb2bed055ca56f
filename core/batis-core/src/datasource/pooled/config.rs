//! 커넥션 풀 설정

use crate::error::{BatisError, BatisResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder ping query; pings are useless until a real one is set.
pub const NO_PING_QUERY: &str = "NO PING QUERY SET";

/// 풀 한도 및 ping 정책
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 동시에 체크아웃 가능한 최대 커넥션 수
    pub max_active: usize,

    /// 유휴 리스트에 보관하는 최대 커넥션 수
    pub max_idle: usize,

    /// 이 시간보다 오래 체크아웃된 커넥션은 회수 대상
    #[serde(with = "millis")]
    pub max_checkout_time: Duration,

    /// 커넥션 획득 대기 한도
    #[serde(with = "millis")]
    pub time_to_wait: Duration,

    /// 한 번의 획득에서 `max_idle`에 더해 허용하는 불량 커넥션 수
    pub bad_connection_tolerance: usize,

    pub ping_enabled: bool,

    pub ping_query: String,

    /// 이 시간 이상 사용되지 않은 커넥션만 ping
    #[serde(with = "millis")]
    pub ping_not_used_for: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: 10,
            max_idle: 5,
            max_checkout_time: Duration::from_millis(20_000),
            time_to_wait: Duration::from_millis(20_000),
            bad_connection_tolerance: 3,
            ping_enabled: false,
            ping_query: NO_PING_QUERY.to_string(),
            ping_not_used_for: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> BatisResult<()> {
        if self.max_active == 0 {
            return Err(BatisError::Config("max_active must be > 0".to_string()));
        }
        if self.ping_enabled && self.ping_query.trim().is_empty() {
            return Err(BatisError::Config(
                "ping_query must be set when ping is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON document; missing fields take defaults.
    pub fn from_json(json: &str) -> BatisResult<Self> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> BatisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// `Option<Duration>` as optional integer milliseconds.
pub(crate) mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_active, 10);
        assert_eq!(config.max_idle, 5);
        assert_eq!(config.max_checkout_time, Duration::from_secs(20));
        assert_eq!(config.time_to_wait, Duration::from_secs(20));
        assert_eq!(config.bad_connection_tolerance, 3);
        assert!(!config.ping_enabled);
        assert_eq!(config.ping_query, NO_PING_QUERY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_uses_milliseconds_and_defaults() {
        let config =
            PoolConfig::from_json(r#"{"max_active": 3, "time_to_wait": 250}"#).unwrap();
        assert_eq!(config.max_active, 3);
        assert_eq!(config.time_to_wait, Duration::from_millis(250));
        assert_eq!(config.max_idle, 5);

        let back = PoolConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PoolConfig::from_json(r#"{"max_active": 0}"#),
            Err(BatisError::Config(_))
        ));
        assert!(matches!(
            PoolConfig::from_json(r#"{"max_active": "x"}"#),
            Err(BatisError::Serialization(_))
        ));
        let config = PoolConfig {
            ping_enabled: true,
            ping_query: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
