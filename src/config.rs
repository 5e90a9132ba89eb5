use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::WMB_NAMESPACE;
use crate::error::XmapError;

pub const DEFAULT_CONFIG_FILE: &str = "xmap.json";
pub const DEFAULT_TAXONOMY_URL: &str =
    "https://github.com/brain-bican/whole_mouse_brain_taxonomy/raw/refs/heads/main/CCN20230722.json";
pub const DEFAULT_NEO4J_ENDPOINT: &str = "bolt://localhost:7687";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub taxonomy_url: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resources_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub templates_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub reports_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cypher_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub neo4j_endpoint: Option<String>,
}

/// Every location and endpoint a job touches, fixed before the job starts.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectLayout {
    pub root: Utf8PathBuf,
    pub resources_dir: Utf8PathBuf,
    pub templates_dir: Utf8PathBuf,
    pub reports_dir: Utf8PathBuf,
    pub cypher_dir: Utf8PathBuf,
    pub taxonomy_url: String,
    pub namespace: String,
    pub neo4j_endpoint: String,
}

impl ProjectLayout {
    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self {
            resources_dir: root.join("resources"),
            templates_dir: root.join("src").join("templates"),
            reports_dir: root.join("reports"),
            cypher_dir: root.join("src").join("cypher"),
            taxonomy_url: DEFAULT_TAXONOMY_URL.to_string(),
            namespace: WMB_NAMESPACE.to_string(),
            neo4j_endpoint: DEFAULT_NEO4J_ENDPOINT.to_string(),
            root,
        }
    }

    /// Resolves a user-supplied path against the root unless it is absolute.
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn bg2wmb_input(&self) -> Utf8PathBuf {
        self.resources_dir.join("BG_2_WMB_curated_MMC_mappings.csv")
    }

    pub fn bg2wmb_template(&self) -> Utf8PathBuf {
        self.templates_dir.join("BG2WMB_AT_map_template.tsv")
    }

    pub fn whb2wmb_input(&self) -> Utf8PathBuf {
        self.resources_dir
            .join("scFAIR_Siletti_WMB_mapping")
            .join("scFAIR_Siletti_AT_map.tsv")
    }

    pub fn whb2wmb_template(&self) -> Utf8PathBuf {
        self.templates_dir.join("scFAIR_WHB_WMB_template.tsv")
    }

    pub fn homology_sheet(&self) -> Utf8PathBuf {
        self.resources_dir.join("MWB_consensus_homology.csv")
    }

    pub fn default_report(&self) -> Utf8PathBuf {
        self.reports_dir.join("report.csv")
    }

    pub fn mouse_labels_export(&self) -> Utf8PathBuf {
        self.resources_dir.join("mouse_cc_label_iri.tsv")
    }

    pub fn cell_set_map_export(&self) -> Utf8PathBuf {
        self.resources_dir.join("cell_set_map.tsv")
    }

    pub fn cypher_file(&self, name: &str) -> Utf8PathBuf {
        self.cypher_dir.join(format!("{name}.cypher"))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Builds the layout for `root`, applying `path` (or `<root>/xmap.json` when present).
    pub fn resolve(root: Utf8PathBuf, path: Option<&str>) -> Result<ProjectLayout, XmapError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => root.join(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ProjectLayout::with_root(root));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| XmapError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| XmapError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(root, config))
    }

    pub fn resolve_config(root: Utf8PathBuf, config: Config) -> ProjectLayout {
        let mut layout = ProjectLayout::with_root(root);
        if let Some(url) = config.taxonomy_url {
            layout.taxonomy_url = url;
        }
        if let Some(namespace) = config.namespace {
            layout.namespace = namespace.trim_end_matches(':').to_string();
        }
        if let Some(dir) = config.resources_dir {
            layout.resources_dir = layout.resolve(&dir);
        }
        if let Some(dir) = config.templates_dir {
            layout.templates_dir = layout.resolve(&dir);
        }
        if let Some(dir) = config.reports_dir {
            layout.reports_dir = layout.resolve(&dir);
        }
        if let Some(dir) = config.cypher_dir {
            layout.cypher_dir = layout.resolve(&dir);
        }
        if let Some(endpoint) = config.neo4j_endpoint {
            layout.neo4j_endpoint = endpoint;
        }
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hang_off_root() {
        let layout = ProjectLayout::with_root(Utf8PathBuf::from("/work"));
        assert_eq!(
            layout.bg2wmb_template(),
            Utf8PathBuf::from("/work/src/templates/BG2WMB_AT_map_template.tsv")
        );
        assert_eq!(layout.namespace, "WMB");
    }

    #[test]
    fn overrides_resolve_relative_to_root() {
        let config = Config {
            namespace: Some("MBA:".to_string()),
            reports_dir: Some(Utf8PathBuf::from("out")),
            cypher_dir: Some(Utf8PathBuf::from("/abs/cypher")),
            ..Config::default()
        };
        let layout = ConfigLoader::resolve_config(Utf8PathBuf::from("/work"), config);
        assert_eq!(layout.namespace, "MBA");
        assert_eq!(layout.reports_dir, Utf8PathBuf::from("/work/out"));
        assert_eq!(layout.cypher_dir, Utf8PathBuf::from("/abs/cypher"));
        assert_eq!(layout.taxonomy_url, DEFAULT_TAXONOMY_URL);
    }
}
