use std::collections::HashMap;

use super::{types::PriorityConfig, ConfigError};

/// Resolves a source priority tier to a tracker priority label.
#[derive(Debug, Clone)]
pub struct PriorityMap {
    tiers: HashMap<i64, String>,
    default: String,
}

impl PriorityMap {
    pub fn new(tiers: HashMap<i64, String>, default: impl Into<String>) -> Self {
        Self {
            tiers,
            default: default.into(),
        }
    }

    pub fn from_config(config: &PriorityConfig) -> Result<Self, ConfigError> {
        let mut tiers = HashMap::with_capacity(config.tiers.len());
        for (key, label) in &config.tiers {
            let tier: i64 = key.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "priority.tiers key '{}' is not an integer tier",
                    key
                ))
            })?;
            tiers.insert(tier, label.clone());
        }
        Ok(Self::new(tiers, config.default.clone()))
    }

    /// Label for `tier`. Unmapped and missing tiers get the default label.
    pub fn label_for(&self, tier: Option<i64>) -> &str {
        tier.and_then(|t| self.tiers.get(&t))
            .map(String::as_str)
            .unwrap_or(self.default.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config() -> PriorityConfig {
        let mut tiers = BTreeMap::new();
        tiers.insert("1".to_string(), "High".to_string());
        tiers.insert(" 4 ".to_string(), "Lowest".to_string());
        PriorityConfig {
            default: "Medium".to_string(),
            tiers,
        }
    }

    #[test]
    fn test_mapped_tier() {
        let map = PriorityMap::from_config(&config()).unwrap();
        assert_eq!(map.label_for(Some(1)), "High");
        assert_eq!(map.label_for(Some(4)), "Lowest");
    }

    #[test]
    fn test_unmapped_tier_falls_back_to_default() {
        let map = PriorityMap::from_config(&config()).unwrap();
        assert_eq!(map.label_for(Some(9)), "Medium");
        assert_eq!(map.label_for(None), "Medium");
    }

    #[test]
    fn test_bad_key_rejected() {
        let mut cfg = config();
        cfg.tiers.insert("high".to_string(), "High".to_string());
        assert!(matches!(
            PriorityMap::from_config(&cfg),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
