//! Fleet configuration loading and validation
//!
//! The fleet is described by a TOML file: the target solution name, an
//! optional base directory, and one table per project. Executable paths may
//! be relative; they resolve against `base_dir`, which itself resolves
//! against the config file's directory. Validation errors name the exact
//! field so a typo is findable without reading the loader.
//!
//! ```toml
//! solution = "AllApps"
//! base_dir = "bin"
//!
//! [[projects]]
//! name = "ISA"
//! executable = "InstrumentSimApp"
//! color = "#9B3E46CE"
//! run = true
//! attach = true
//! ```

use crate::{CoreError, Result};
use schema::Project;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw config file shape before validation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FleetFile {
    solution: String,
    #[serde(default, alias = "baseDir")]
    base_dir: Option<PathBuf>,
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectEntry {
    name: String,
    executable: PathBuf,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    run: bool,
    #[serde(default)]
    attach: bool,
}

/// Validated fleet configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    solution: String,
    projects: Vec<Project>,
}

impl FleetConfig {
    /// Load and validate a fleet configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "Cannot read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::parse(&content, path.parent().unwrap_or(Path::new(".")))?;
        debug!(path = %path.display(), projects = config.projects.len(), "Loaded fleet config");
        Ok(config)
    }

    /// Parse and validate config text, resolving relative paths against
    /// `config_dir`
    pub fn parse(content: &str, config_dir: &Path) -> Result<Self> {
        let file: FleetFile = toml::from_str(content)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid config file: {}", e)))?;
        Self::validate(file, config_dir)
    }

    fn validate(file: FleetFile, config_dir: &Path) -> Result<Self> {
        if file.solution.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "'solution' must not be empty".to_string(),
            ));
        }
        if file.projects.is_empty() {
            return Err(CoreError::ValidationError(
                "'projects' must contain at least one entry".to_string(),
            ));
        }

        let base_dir = match file.base_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        };

        let mut seen = HashSet::new();
        let mut projects = Vec::with_capacity(file.projects.len());
        for (index, entry) in file.projects.into_iter().enumerate() {
            let field = |name: &str| format!("projects[{}].{}", index, name);

            if entry.name.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "'{}' must not be empty",
                    field("name")
                )));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(CoreError::ValidationError(format!(
                    "'{}': duplicate project name '{}'",
                    field("name"),
                    entry.name
                )));
            }
            if entry.executable.as_os_str().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "'{}' must not be empty",
                    field("executable")
                )));
            }
            if let Some(color) = &entry.color {
                if !is_valid_color(color) {
                    return Err(CoreError::ValidationError(format!(
                        "'{}': '{}' is not a #AARRGGBB color",
                        field("color"),
                        color
                    )));
                }
            }

            let executable = if entry.executable.is_absolute() {
                entry.executable
            } else {
                base_dir.join(entry.executable)
            };

            let mut project = match entry.color {
                Some(color) => Project::with_color(entry.name, executable, color),
                None => Project::new(entry.name, executable),
            };
            project.set_run(entry.run);
            if entry.attach {
                project.set_attach(true);
            }
            projects.push(project);
        }

        Ok(Self {
            solution: file.solution,
            projects,
        })
    }

    pub fn solution(&self) -> &str {
        &self.solution
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn into_projects(self) -> (String, Vec<Project>) {
        (self.solution, self.projects)
    }
}

/// `#AARRGGBB`: a hash followed by exactly eight hex digits
fn is_valid_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    hex.len() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit())
}
