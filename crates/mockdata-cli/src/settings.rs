use std::path::Path;

use clap::ValueEnum;
use thiserror::Error;

use mockdata_core::SourceFormat;
use mockdata_generate::GenerateOptions;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read run config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid run config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Date encodings accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Analysis,
    Csv,
    Sas,
}

impl From<FormatArg> for SourceFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Analysis => SourceFormat::Analysis,
            FormatArg::Csv => SourceFormat::Csv,
            FormatArg::Sas => SourceFormat::Sas,
        }
    }
}

/// Command-line values that take precedence over the run config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub window: Option<String>,
    pub rows: Option<usize>,
    pub seed: Option<u64>,
    pub format: Option<FormatArg>,
    pub strict: bool,
    pub variables: Vec<String>,
}

/// Read batch options from a TOML run config.
pub fn load_run_config(path: &Path) -> Result<GenerateOptions, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn apply_overrides(options: &mut GenerateOptions, overrides: Overrides) {
    if let Some(window) = overrides.window {
        options.window = window;
    }
    if let Some(rows) = overrides.rows {
        options.rows = rows;
    }
    if let Some(seed) = overrides.seed {
        options.seed = seed;
    }
    if let Some(format) = overrides.format {
        options.source_format = Some(format.into());
    }
    if overrides.strict {
        options.strict = true;
    }
    if !overrides.variables.is_empty() {
        options.variables = Some(overrides.variables);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn example_run_config_parses() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../metadata/examples/run.toml");
        let options = load_run_config(&path).expect("run config");
        assert_eq!(options.window, "cycle1");
        assert_eq!(options.source_format, Some(SourceFormat::Csv));
        let survival = options.survival.expect("survival");
        assert_eq!(survival.entry, "entry_date");
        assert_eq!(
            survival.event.map(|event| event.variable),
            Some("primary_event_date".to_string())
        );
        assert!((options.proportions["smoking"]["996"] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn flags_win_over_config() {
        let mut options: GenerateOptions =
            toml::from_str("window = \"cycle1\"\nrows = 10\nseed = 1\n").expect("toml");
        apply_overrides(
            &mut options,
            Overrides {
                window: Some("cycle2".to_string()),
                seed: Some(9),
                format: Some(FormatArg::Sas),
                ..Overrides::default()
            },
        );
        assert_eq!(options.window, "cycle2");
        assert_eq!(options.rows, 10);
        assert_eq!(options.seed, 9);
        assert_eq!(options.source_format, Some(SourceFormat::Sas));
        assert!(options.variables.is_none());
    }

    #[test]
    fn unknown_format_is_a_parse_error() {
        let result: Result<GenerateOptions, _> = toml::from_str("source_format = \"excel\"\n");
        assert!(result.is_err());
    }
}
