//! Defect code catalog
//!
//! Read-only lookup table of known defect codes (VSA / EN 13508-2) with
//! their attribute requirements. The built-in table can be replaced by a
//! TOML file:
//!
//! ```toml
//! [[codes]]
//! code = "BAB"
//! label = "Circumferential crack"
//! requires_characterization = false
//! requires_quantification = true
//! quant_unit = "mm"
//! ```

use crate::error::{AiError, AiResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Catalog entry for one defect code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub requires_characterization: bool,
    #[serde(default)]
    pub requires_quantification: bool,
    /// Expected quantification unit ("%", "mm", "cm"), none when not quantified
    #[serde(default)]
    pub quant_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    codes: Vec<CodeInfo>,
}

/// Read-only code catalog keyed by upper-case code
#[derive(Debug, Clone)]
pub struct CodeCatalog {
    codes: BTreeMap<String, CodeInfo>,
}

// (code, label, requires_characterization, requires_quantification, unit)
const BUILTIN_CODES: &[(&str, &str, bool, bool, Option<&str>)] = &[
    // Cracks / fractures
    ("BAA", "Longitudinal crack", false, true, Some("mm")),
    ("BAB", "Circumferential crack", false, true, Some("mm")),
    ("BAC", "Spiral crack", false, true, Some("mm")),
    ("BAD", "Multiple cracks", false, true, Some("mm")),
    ("BAE", "Fracture", false, false, None),
    ("BAF", "Missing piece", false, false, None),
    // Deformation
    ("BBA", "Deformation", true, true, Some("%")),
    ("BBB", "Collapse", false, false, None),
    // Wall damage
    ("BCA", "Surface damage", true, true, Some("%")),
    ("BCB", "Corrosion", true, true, Some("%")),
    ("BCC", "Encrustation", true, true, Some("%")),
    // Displacement
    ("BDA", "Displaced joint", false, true, Some("mm")),
    ("BDB", "Axial deviation", false, true, Some("mm")),
    // Leakage
    ("BEA", "Infiltration", false, false, None),
    ("BEB", "Exfiltration", false, false, None),
    ("BEC", "Visible leak", false, false, None),
    // Obstacles / deposits
    ("BFA", "Deposits", true, true, Some("%")),
    ("BFB", "Intruding connection", false, true, Some("%")),
    ("BFC", "Intruding pipe", false, true, Some("%")),
    ("BFD", "Foreign object", false, false, None),
    // Connections
    ("BGA", "Connection", false, false, None),
    ("BGB", "Defective connection", false, false, None),
    // Repairs
    ("BHA", "Repair", false, false, None),
    ("BHB", "Patch", false, false, None),
];

impl CodeCatalog {
    /// Built-in VSA catalog
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_CODES.iter().map(
            |&(code, label, requires_characterization, requires_quantification, unit)| CodeInfo {
                code: code.to_string(),
                label: label.to_string(),
                requires_characterization,
                requires_quantification,
                quant_unit: unit.map(str::to_string),
            },
        ))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CodeInfo>,
    {
        let codes = entries
            .into_iter()
            .map(|mut info| {
                info.code = normalize(&info.code);
                (info.code.clone(), info)
            })
            .collect();
        Self { codes }
    }

    /// Parse a `[[codes]]` TOML catalog
    pub fn from_toml_str(content: &str) -> AiResult<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| AiError::InvalidInput(format!("Invalid catalog: {}", e)))?;
        if file.codes.is_empty() {
            return Err(AiError::InvalidInput("Catalog contains no codes".to_string()));
        }
        Ok(Self::from_entries(file.codes))
    }

    /// Load a TOML catalog file
    pub fn load(path: &Path) -> AiResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        info!(path = %path.display(), codes = catalog.len(), "Loaded code catalog");
        Ok(catalog)
    }

    /// Load `path` when given, otherwise the built-in table
    pub fn load_or_builtin(path: Option<&Path>) -> AiResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn is_known(&self, code: &str) -> bool {
        !code.trim().is_empty() && self.codes.contains_key(&normalize(code))
    }

    pub fn get(&self, code: &str) -> Option<&CodeInfo> {
        self.codes.get(&normalize(code))
    }

    /// All entries, ordered by code
    pub fn codes(&self) -> impl Iterator<Item = &CodeInfo> {
        self.codes.values()
    }

    /// Space-separated code list for model prompts
    pub fn code_list(&self) -> String {
        self.codes.keys().cloned().collect::<Vec<_>>().join(" ")
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CodeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let catalog = CodeCatalog::builtin();
        assert_eq!(catalog.len(), 24);
        assert!(catalog.is_known("bab"));
        assert_eq!(catalog.get("BAB").unwrap().quant_unit.as_deref(), Some("mm"));
        assert!(catalog.get("BCC").unwrap().requires_characterization);
    }

    #[test]
    fn test_unknown_and_blank_codes() {
        let catalog = CodeCatalog::builtin();
        assert!(!catalog.is_known("XYZ"));
        assert!(!catalog.is_known("   "));
    }

    #[test]
    fn test_code_list_is_sorted() {
        let list = CodeCatalog::builtin().code_list();
        assert!(list.starts_with("BAA BAB"));
        assert!(list.ends_with("BHB"));
    }

    #[test]
    fn test_toml_catalog_replaces_builtin() {
        let catalog = CodeCatalog::from_toml_str(
            r#"
            [[codes]]
            code = "xaa"
            label = "Custom"
            requires_quantification = true
            quant_unit = "cm"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        let info = catalog.get("XAA").unwrap();
        assert_eq!(info.code, "XAA");
        assert!(!info.requires_characterization);
        assert!(!catalog.is_known("BAB"));
    }

    #[test]
    fn test_empty_toml_catalog_rejected() {
        assert!(CodeCatalog::from_toml_str("codes = []").is_err());
    }
}
