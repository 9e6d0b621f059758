use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub images: ImagesConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    /// Directory holding all stored image files (flat).
    pub dir: PathBuf,
}

/// Tuning knobs for the similarity scorer.
///
/// All defaults are hand-tuned against real studio photos; change them
/// only alongside the scoring property tests.
#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Minimum combined score a candidate must reach to appear in results.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Result cap after sorting.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Square working resolution both images are resampled to.
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// Scores at or above this are promoted ahead of all others
    /// (near-exact duplicates surface first).
    #[serde(default = "default_promote_cutoff")]
    pub promote_cutoff: f64,
    /// Candidate window: records created within the last N months.
    #[serde(default = "default_window_months")]
    pub window_months: u32,
    #[serde(default)]
    pub weights: SignalWeights,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            top_k: default_top_k(),
            resolution: default_resolution(),
            promote_cutoff: default_promote_cutoff(),
            window_months: default_window_months(),
            weights: SignalWeights::default(),
        }
    }
}

fn default_min_score() -> f64 {
    0.45
}
fn default_top_k() -> usize {
    12
}
fn default_resolution() -> u32 {
    96
}
fn default_promote_cutoff() -> f64 {
    0.9
}
fn default_window_months() -> u32 {
    6
}

/// Per-signal weights for the combined score. Hand-tuned; they need not
/// sum to exactly 1 because the combiner renormalizes over the signals
/// that are informative for a given pair.
#[derive(Debug, Deserialize, Clone)]
pub struct SignalWeights {
    #[serde(default = "w_contour")]
    pub contour: f64,
    #[serde(default = "w_color_sweep")]
    pub color_sweep: f64,
    #[serde(default = "w_histogram")]
    pub histogram: f64,
    #[serde(default = "w_structure")]
    pub structure: f64,
    #[serde(default = "w_pattern")]
    pub pattern: f64,
    #[serde(default = "w_mean_color")]
    pub mean_color: f64,
    #[serde(default = "w_texture")]
    pub texture: f64,
    #[serde(default = "w_symmetry")]
    pub symmetry: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            contour: w_contour(),
            color_sweep: w_color_sweep(),
            histogram: w_histogram(),
            structure: w_structure(),
            pattern: w_pattern(),
            mean_color: w_mean_color(),
            texture: w_texture(),
            symmetry: w_symmetry(),
        }
    }
}

fn w_contour() -> f64 {
    0.22
}
fn w_color_sweep() -> f64 {
    0.18
}
fn w_histogram() -> f64 {
    0.14
}
fn w_structure() -> f64 {
    0.12
}
fn w_pattern() -> f64 {
    0.12
}
fn w_mean_color() -> f64 {
    0.10
}
fn w_texture() -> f64 {
    0.07
}
fn w_symmetry() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// `disabled` or `google`.
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    #[serde(default = "default_ocr_retries")]
    pub max_retries: u32,
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            max_retries: default_ocr_retries(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

fn default_ocr_provider() -> String {
    "disabled".to_string()
}
fn default_ocr_retries() -> u32 {
    3
}
fn default_ocr_timeout() -> u64 {
    20
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate similarity tuning
    if !(0.0..=1.0).contains(&config.similarity.min_score) {
        anyhow::bail!("similarity.min_score must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.similarity.promote_cutoff) {
        anyhow::bail!("similarity.promote_cutoff must be in [0.0, 1.0]");
    }
    if config.similarity.top_k == 0 {
        anyhow::bail!("similarity.top_k must be >= 1");
    }
    if !(16..=512).contains(&config.similarity.resolution) {
        anyhow::bail!("similarity.resolution must be in [16, 512]");
    }
    let w = &config.similarity.weights;
    for (name, value) in [
        ("contour", w.contour),
        ("color_sweep", w.color_sweep),
        ("histogram", w.histogram),
        ("structure", w.structure),
        ("pattern", w.pattern),
        ("mean_color", w.mean_color),
        ("texture", w.texture),
        ("symmetry", w.symmetry),
    ] {
        if value < 0.0 {
            anyhow::bail!("similarity.weights.{} must be >= 0", name);
        }
    }

    match config.ocr.provider.as_str() {
        "disabled" | "google" => {}
        other => anyhow::bail!("Unknown OCR provider: '{}'. Must be disabled or google.", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
[db]
path = "/tmp/kiln.sqlite"

[images]
dir = "/tmp/kiln-images"

[server]
bind = "127.0.0.1:7410"
"#
        .to_string()
    }

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        // Re-run the same validation load_config applies
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, toml_str).unwrap();
        load_config(&path)?;
        Ok(config)
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(&minimal_toml()).unwrap();
        assert_eq!(config.similarity.min_score, 0.45);
        assert_eq!(config.similarity.top_k, 12);
        assert_eq!(config.similarity.resolution, 96);
        assert_eq!(config.similarity.window_months, 6);
        assert_eq!(config.ocr.provider, "disabled");
        assert!(!config.ocr.is_enabled());
    }

    #[test]
    fn test_weight_defaults_positive() {
        let w = SignalWeights::default();
        for value in [
            w.contour, w.color_sweep, w.histogram, w.structure, w.pattern, w.mean_color,
            w.texture, w.symmetry,
        ] {
            assert!(value > 0.0);
        }
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let toml_str = format!("{}\n[similarity]\nmin_score = 1.5\n", minimal_toml());
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn test_rejects_unknown_ocr_provider() {
        let toml_str = format!("{}\n[ocr]\nprovider = \"tesseract\"\n", minimal_toml());
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let toml_str = format!("{}\n[similarity]\ntop_k = 0\n", minimal_toml());
        assert!(parse(&toml_str).is_err());
    }
}
