//! Per-campaign target values and alert thresholds, persisted as a flat JSON
//! file the dashboard edits in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::TARGETS_FILE;
use crate::models::{KpiKind, TargetClass};
use crate::storage::{self, StorageError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub name: Option<String>,
    pub target_cpf: Option<f64>,
    pub target_cpa: Option<f64>,
    pub target_roas: Option<f64>,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TargetSpec {
    pub fn target_for(&self, kind: KpiKind) -> Option<f64> {
        match kind {
            KpiKind::Cpf => self.target_cpf,
            KpiKind::Cpa => self.target_cpa,
            KpiKind::Roas => self.target_roas,
            KpiKind::Cpm => None,
        }
    }

    /// Warning and critical levels for the KPI. Explicit thresholds win;
    /// otherwise they are derived from the target value with the standard
    /// ladder (CPF/CPM 2x/4x, CPA 1.0x/1.3x, ROAS 2/3 and 1/3 of target).
    pub fn thresholds_for(&self, kind: KpiKind) -> Option<(f64, f64)> {
        if let (Some(warning), Some(critical)) = (self.warning_threshold, self.critical_threshold)
        {
            return Some((warning, critical));
        }

        let target = self.target_for(kind)?;
        Some(match kind {
            KpiKind::Cpf | KpiKind::Cpm => (target * 2.0, target * 4.0),
            KpiKind::Cpa => (target, target * 1.3),
            KpiKind::Roas => (target * 2.0 / 3.0, target / 3.0),
        })
    }

    /// Warning must sit before critical in the "worse" direction of the KPI.
    pub fn validate(&self, kind: KpiKind) -> Result<(), TargetError> {
        if let (Some(warning), Some(critical)) = (self.warning_threshold, self.critical_threshold)
        {
            let ordered = if kind.higher_is_worse() {
                warning < critical
            } else {
                warning > critical
            };
            if !ordered {
                return Err(TargetError::InvalidThresholds {
                    kind,
                    warning,
                    critical,
                });
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("{kind:?} thresholds out of order: warning {warning}, critical {critical}")]
    InvalidThresholds {
        kind: KpiKind,
        warning: f64,
        critical: f64,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct TargetsFile {
    defaults: HashMap<TargetClass, TargetSpec>,
    campaigns: HashMap<String, TargetSpec>,
}

impl Default for TargetsFile {
    fn default() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert(
            TargetClass::Traffic,
            TargetSpec {
                target_cpf: Some(50.0),
                warning_threshold: Some(100.0),
                critical_threshold: Some(200.0),
                ..TargetSpec::default()
            },
        );
        defaults.insert(
            TargetClass::Sales,
            TargetSpec {
                target_cpa: Some(5000.0),
                target_roas: Some(3.0),
                ..TargetSpec::default()
            },
        );

        Self {
            defaults,
            campaigns: HashMap::new(),
        }
    }
}

pub struct TargetRegistry {
    path: PathBuf,
    targets: TargetsFile,
}

impl TargetRegistry {
    pub fn load(storage_dir: &Path) -> Result<Self, StorageError> {
        let path = storage_dir.join(TARGETS_FILE);
        let targets = storage::load_json(&path)?.unwrap_or_default();
        Ok(Self { path, targets })
    }

    /// Campaign-specific targets, falling back to the class defaults.
    pub fn for_campaign(&self, campaign_id: &str, class: TargetClass) -> TargetSpec {
        if let Some(spec) = self.targets.campaigns.get(campaign_id) {
            return spec.clone();
        }
        self.targets
            .defaults
            .get(&class)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_campaign(
        &mut self,
        campaign_id: &str,
        campaign_name: &str,
        mut spec: TargetSpec,
        kind: KpiKind,
    ) -> Result<(), TargetError> {
        spec.validate(kind)?;
        spec.name = Some(campaign_name.to_string());
        spec.updated_at = Some(Utc::now());

        self.targets
            .campaigns
            .insert(campaign_id.to_string(), spec);
        self.save()?;
        tracing::info!(campaign = campaign_name, "campaign targets updated");
        Ok(())
    }

    pub fn set_defaults(
        &mut self,
        class: TargetClass,
        spec: TargetSpec,
        kind: KpiKind,
    ) -> Result<(), TargetError> {
        spec.validate(kind)?;
        self.targets.defaults.insert(class, spec);
        self.save()?;
        Ok(())
    }

    /// Drops the campaign override so it falls back to the class defaults.
    pub fn remove_campaign(&mut self, campaign_id: &str) -> Result<bool, TargetError> {
        let removed = self.targets.campaigns.remove(campaign_id).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn campaign_overrides(&self) -> &HashMap<String, TargetSpec> {
        &self.targets.campaigns
    }

    fn save(&self) -> Result<(), StorageError> {
        storage::store_json(&self.path, &self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_class_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TargetRegistry::load(dir.path()).unwrap();

        let default = registry.for_campaign("c1", TargetClass::Traffic);
        assert_eq!(default.target_cpf, Some(50.0));

        registry
            .set_campaign(
                "c1",
                "Followers JP",
                TargetSpec {
                    target_cpf: Some(500.0),
                    warning_threshold: Some(600.0),
                    critical_threshold: Some(800.0),
                    ..TargetSpec::default()
                },
                KpiKind::Cpf,
            )
            .unwrap();

        let spec = registry.for_campaign("c1", TargetClass::Traffic);
        assert_eq!(spec.target_cpf, Some(500.0));
        assert_eq!(spec.thresholds_for(KpiKind::Cpf), Some((600.0, 800.0)));

        // unrelated campaigns still see the defaults
        let other = registry.for_campaign("c2", TargetClass::Traffic);
        assert_eq!(other.target_cpf, Some(50.0));
    }

    #[test]
    fn registry_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut registry = TargetRegistry::load(dir.path()).unwrap();
            registry
                .set_campaign(
                    "c9",
                    "Sales Q3",
                    TargetSpec {
                        target_roas: Some(4.0),
                        warning_threshold: Some(2.5),
                        critical_threshold: Some(1.2),
                        ..TargetSpec::default()
                    },
                    KpiKind::Roas,
                )
                .unwrap();
        }

        let registry = TargetRegistry::load(dir.path()).unwrap();
        let spec = registry.for_campaign("c9", TargetClass::Sales);
        assert_eq!(spec.target_roas, Some(4.0));
        assert_eq!(spec.name.as_deref(), Some("Sales Q3"));
    }

    #[test]
    fn cost_thresholds_must_ascend() {
        let spec = TargetSpec {
            warning_threshold: Some(800.0),
            critical_threshold: Some(600.0),
            ..TargetSpec::default()
        };
        assert!(spec.validate(KpiKind::Cpf).is_err());
        // the same ordering is valid for ROAS, where lower is worse
        assert!(spec.validate(KpiKind::Roas).is_ok());
    }

    #[test]
    fn roas_thresholds_must_descend() {
        let spec = TargetSpec {
            warning_threshold: Some(1.0),
            critical_threshold: Some(2.0),
            ..TargetSpec::default()
        };
        assert!(spec.validate(KpiKind::Roas).is_err());
        assert!(spec.validate(KpiKind::Cpa).is_ok());
    }

    #[test]
    fn thresholds_derive_from_target_when_absent() {
        let spec = TargetSpec {
            target_cpa: Some(5000.0),
            ..TargetSpec::default()
        };
        assert_eq!(spec.thresholds_for(KpiKind::Cpa), Some((5000.0, 6500.0)));

        let sales = TargetSpec {
            target_roas: Some(3.0),
            ..TargetSpec::default()
        };
        let (warning, critical) = sales.thresholds_for(KpiKind::Roas).unwrap();
        assert!((warning - 2.0).abs() < 1e-9);
        assert!((critical - 1.0).abs() < 1e-9);
    }

    #[test]
    fn removing_override_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TargetRegistry::load(dir.path()).unwrap();
        registry
            .set_campaign("c1", "Temp", TargetSpec::default(), KpiKind::Cpf)
            .unwrap();
        assert!(registry.remove_campaign("c1").unwrap());
        assert!(!registry.remove_campaign("c1").unwrap());
        assert_eq!(
            registry.for_campaign("c1", TargetClass::Traffic).target_cpf,
            Some(50.0)
        );
    }
}
