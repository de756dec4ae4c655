use serde::{Deserialize, Serialize};

// ---------- data/prs/<variant>.yaml ----------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrsVariant {
    /// Rust type name generated for the variant, e.g. `Standard`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub channels: u8,
    pub ipversion: u32,
    pub channel_ctrl: ChannelCtrl,
    pub sources: Vec<Source>,
    pub consumers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelCtrl {
    pub byte_offset: u32,
    pub sigsel: BitField,
    pub sourcesel: BitField,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BitField {
    pub bit_offset: u8,
    pub bit_size: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Name of the `prs::Source` variant.
    pub source: String,
    pub id: u8,
    pub signals: Vec<SourceSignal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceSignal {
    /// Name of the `event::Signal` variant.
    pub signal: String,
    pub id: u8,
}
