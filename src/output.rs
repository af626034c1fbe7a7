//! Dataset files: pretty JSON for researchers and a script form that assigns
//! the same JSON to a global the static pages load with a `<script>` tag.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::SecondsFormat;
use tempfile::NamedTempFile;

use crate::models::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptWrapper {
    /// `dashboard-data.js`
    Dashboard,
    /// `student-map-data.js`
    YoungAdult,
}

impl ScriptWrapper {
    pub fn global(self) -> &'static str {
        match self {
            ScriptWrapper::Dashboard => "DASHBOARD_DATA",
            ScriptWrapper::YoungAdult => "YOUNG_ADULT_DATA",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ScriptWrapper::Dashboard => "Financial Health Barometer Data",
            ScriptWrapper::YoungAdult => "Young Adult Financial Health Map Data",
        }
    }

    fn footer(self) -> String {
        let global = self.global();
        match self {
            ScriptWrapper::Dashboard => format!(
                "if (typeof window !== 'undefined') window.{global} = {global};\n\
                 if (typeof module !== 'undefined') module.exports = {global};\n"
            ),
            ScriptWrapper::YoungAdult => format!(
                "// Export for use\n\
                 if (typeof module !== 'undefined' && module.exports) {{\n    module.exports = {global};\n}}\n"
            ),
        }
    }
}

pub fn to_json(dataset: &Dataset) -> Result<String> {
    let mut json = serde_json::to_string_pretty(dataset).context("failed to serialize dataset")?;
    json.push('\n');
    Ok(json)
}

/// The header timestamp comes from `meta.generated`, so the same dataset
/// always renders to the same bytes.
pub fn to_script(dataset: &Dataset, wrapper: ScriptWrapper) -> Result<String> {
    let json = serde_json::to_string_pretty(dataset).context("failed to serialize dataset")?;
    let generated = dataset.meta.generated.to_rfc3339_opts(SecondsFormat::Millis, true);

    Ok(format!(
        "// {title}\n// Auto-generated: {generated}\n// Sources: {sources}\n\nconst {global} = {json};\n\n{footer}",
        title = wrapper.title(),
        sources = dataset.meta.source,
        global = wrapper.global(),
        footer = wrapper.footer(),
    ))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Writes to a temp file beside `target`, then renames it over the target so
/// readers never see a partial file.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(target);
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write {}", target.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", target.display()))?;
    tmp.persist(target)
        .with_context(|| format!("failed to rename into {}", target.display()))?;
    Ok(())
}

/// Writes the JSON file and its script twin.
pub fn write_dataset(dataset: &Dataset, json_path: &Path, script_path: &Path, wrapper: ScriptWrapper) -> Result<()> {
    write_atomic(json_path, to_json(dataset)?.as_bytes())?;
    write_atomic(script_path, to_script(dataset, wrapper)?.as_bytes())?;
    Ok(())
}

/// The JSON literal assigned in a generated script: from the first ` = `
/// after `const` to the closing brace of the last `};`.
pub fn extract_script_json(script: &str) -> Option<&str> {
    let declaration = script.find("const ")?;
    let start = declaration + script[declaration..].find(" = ")? + 3;
    let end = script.rfind("};")? + 1;
    (end > start).then(|| script[start..end].trim())
}

/// Loads a dataset from either a `.json` file or a generated `.js` script.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let json = if path.extension().and_then(|ext| ext.to_str()) == Some("js") {
        extract_script_json(&raw).ok_or_else(|| anyhow!("no data assignment found in {}", path.display()))?
    } else {
        raw.as_str()
    };

    serde_json::from_str(json).with_context(|| format!("failed to parse {}", path.display()))
}
