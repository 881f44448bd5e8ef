//! Typed configuration (component L), mirroring the recognized keys of
//! spec §6 with their documented defaults. This struct is pure data —
//! parsing it from TOML/env lives in the `server` binary; `core` never
//! touches the filesystem.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::track::MpConfig;

fn default_trig() -> String {
    "255".into()
}

fn default_passlevel() -> u8 {
    40
}

fn default_uport() -> u16 {
    2008
}

fn default_basetopic() -> String {
    "velotrain".into()
}

fn default_laplen() -> f64 {
    250.0
}

fn default_maxspeed() -> f64 {
    90.0
}

fn default_minspeed() -> f64 {
    38.0
}

fn default_gatedelay() -> f64 {
    0.075
}

fn default_mingate() -> f64 {
    9.0
}

fn default_maxgate() -> f64 {
    22.5
}

fn default_dhiencoding() -> String {
    "utf-8".into()
}

fn default_mpseq() -> Vec<String> {
    ["C1", "C9", "C4", "C6", "C3", "C5", "C7", "C8", "C2"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub authkey: Option<String>,

    #[serde(default)]
    pub gate: Option<String>,

    #[serde(default = "default_gatedelay")]
    pub gatedelay: f64,

    #[serde(default)]
    pub gatesrc: Option<String>,

    #[serde(default = "default_laplen")]
    pub laplen: f64,

    #[serde(default = "default_maxspeed")]
    pub maxspeed: f64,

    #[serde(default = "default_minspeed")]
    pub minspeed: f64,

    #[serde(default)]
    pub moto: Vec<String>,

    #[serde(default = "default_trig")]
    pub trig: String,

    #[serde(default = "default_passlevel")]
    pub passlevel: u8,

    #[serde(default)]
    pub uaddr: Option<String>,

    #[serde(default = "default_uport")]
    pub uport: u16,

    #[serde(default)]
    pub bcast: Option<String>,

    #[serde(default = "default_basetopic")]
    pub basetopic: String,

    /// Channel name of the synchronisation master (§4.3, §9 policy).
    #[serde(default)]
    pub sync: Option<String>,

    #[serde(default = "default_mingate")]
    pub mingate: f64,

    #[serde(default = "default_maxgate")]
    pub maxgate: f64,

    #[serde(default)]
    pub dhi: Option<String>,

    #[serde(default = "default_dhiencoding")]
    pub dhiencoding: String,

    #[serde(default = "default_mpseq")]
    pub mpseq: Vec<String>,

    #[serde(default)]
    pub mps: HashMap<String, MpConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            authkey: None,
            gate: None,
            gatedelay: default_gatedelay(),
            gatesrc: None,
            laplen: default_laplen(),
            maxspeed: default_maxspeed(),
            minspeed: default_minspeed(),
            moto: Vec::new(),
            trig: default_trig(),
            passlevel: default_passlevel(),
            uaddr: None,
            uport: default_uport(),
            bcast: None,
            basetopic: default_basetopic(),
            sync: None,
            mingate: default_mingate(),
            maxgate: default_maxgate(),
            dhi: None,
            dhiencoding: default_dhiencoding(),
            mpseq: default_mpseq(),
            mps: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.gatedelay, 0.075);
        assert_eq!(cfg.laplen, 250.0);
        assert_eq!(cfg.maxspeed, 90.0);
        assert_eq!(cfg.minspeed, 38.0);
        assert_eq!(cfg.trig, "255");
        assert_eq!(cfg.passlevel, 40);
        assert_eq!(cfg.uport, 2008);
        assert_eq!(cfg.basetopic, "velotrain");
        assert_eq!(cfg.mingate, 9.0);
        assert_eq!(cfg.maxgate, 22.5);
        assert_eq!(cfg.dhiencoding, "utf-8");
        assert_eq!(cfg.mpseq.len(), 9);
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let toml_src = r#"
            laplen = 333.0
            moto = ["C10"]
        "#;
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.laplen, 333.0);
        assert_eq!(cfg.moto, vec!["C10".to_string()]);
        assert_eq!(cfg.gatedelay, 0.075); // untouched key keeps its default
    }
}
