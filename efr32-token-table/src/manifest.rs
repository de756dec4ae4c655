use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use efr32_periph::devinfo::DeviceInfo;
use efr32_periph::userdata::TokenLayout;
use serde::Deserialize;

/// Token manifest.
///
/// ```hjson
/// {
///   tokens: {
///     MFG_CUSTOM_EUI_64: "0011223344556677"
///     MFG_CTUNE: "8c00"
///   }
/// }
/// ```
///
/// `layout` replaces the default manufacturing layout when present.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub layout: Option<TokenLayout>,
    /// Token name to value, as hex bytes in page order.
    pub tokens: BTreeMap<String, String>,
    /// DEVINFO contents for the `devinfo` command.
    pub devinfo: Option<DeviceInfo>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        serde_hjson::from_str(text).map_err(|e| anyhow!("invalid manifest: {e}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// The layout in effect, checked for overlaps.
    pub fn layout(&self) -> Result<TokenLayout> {
        let layout = self.layout.clone().unwrap_or_default();
        layout.validate().map_err(|e| anyhow!("bad token layout: {e}"))?;
        Ok(layout)
    }
}

/// Parse a hex byte string. Whitespace, `_` and `:` separators and a `0x` prefix are accepted.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    let text = text.strip_prefix("0x").unwrap_or(text);
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b'_' && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in {text:?}");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).context("non-ASCII hex digit")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte {pair:?}"))
        })
        .collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        assert_eq!(parse_hex("0x00 11:22_ff").unwrap(), vec![0x00, 0x11, 0x22, 0xff]);
        assert_eq!(to_hex(&[0x8c, 0x00]), "8c00");
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn manifest_defaults_to_manufacturing_layout() {
        let manifest = Manifest::parse(
            r#"{
                tokens: {
                    MFG_CTUNE: "8c00"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.layout().unwrap(), TokenLayout::default());
        assert_eq!(manifest.tokens["MFG_CTUNE"], "8c00");
        assert!(manifest.devinfo.is_none());
    }

    #[test]
    fn manifest_layout_override() {
        let manifest = Manifest::parse(
            r#"{
                layout: [
                    { name: "BOARD_REV", offset: 0, size: 4 }
                    { name: "SERIAL", offset: 2, size: 8 }
                ]
            }"#,
        )
        .unwrap();
        assert!(manifest.layout().is_err());
    }

    #[test]
    fn manifest_devinfo_overrides() {
        let manifest = Manifest::parse(
            r#"{
                devinfo: {
                    devicenum: 1220
                    eui64: 42
                }
            }"#,
        )
        .unwrap();
        let devinfo = manifest.devinfo.unwrap();
        assert_eq!(devinfo.devicenum, 1220);
        assert_eq!(devinfo.eui64, 42);
        assert_eq!(devinfo.flash_kib, DeviceInfo::default().flash_kib);
    }
}
