//! Check command - validate configuration and templates

use std::path::Path;

use chrono::NaiveDate;
use color_eyre::eyre::{Result, bail};
use issuesite_core::SiteConfig;
use issuesite_generator::{Renderer, TemplateRegistry};

/// Date format of `special.card.since`.
const SINCE_FORMAT: &str = "%Y.%m.%d";

/// Validation result.
#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the check command.
///
/// Validates configuration, templates, and the syntax theme without
/// touching the network or the output directory.
pub fn run(config_path: &Path, strict: bool) -> Result<()> {
    tracing::info!(?config_path, strict, "Checking configuration and templates");

    let mut result = ValidationResult::default();

    println!("Checking configuration...");
    let config = match SiteConfig::load_with_env(config_path) {
        Ok(c) => {
            println!("  ✓ Configuration valid");
            Some(c)
        }
        Err(e) => {
            result.add_error(format!("Configuration error: {e}"));
            println!("  ✗ Configuration invalid: {e}");
            None
        }
    };

    if let Some(ref cfg) = config {
        println!("\nChecking templates...");
        check_templates(cfg, &mut result);

        println!("\nChecking configuration values...");
        for warning in quick_validate(cfg, false) {
            result.add_warning(warning);
        }
    }

    println!();
    println!("Summary:");
    println!("  Errors:   {}", result.errors.len());
    println!("  Warnings: {}", result.warnings.len());

    if result.has_errors() {
        println!();
        println!("Errors:");
        for err in &result.errors {
            println!("  ✗ {err}");
        }
    }

    if result.has_warnings() {
        println!();
        println!("Warnings:");
        for warn in &result.warnings {
            println!("  ⚠ {warn}");
        }
    }

    if result.has_errors() {
        bail!("Validation failed with {} error(s)", result.errors.len());
    }

    if strict && result.has_warnings() {
        bail!(
            "Validation failed with {} warning(s) (strict mode)",
            result.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}

/// Quick validation for the build command.
///
/// Returns non-fatal findings. `offline` skips the source checks that only
/// matter when talking to the API.
pub fn quick_validate(config: &SiteConfig, offline: bool) -> Vec<String> {
    let mut warnings = Vec::new();

    if !offline {
        if config.source.repo.is_empty() {
            warnings.push(
                "source.repo is not set; build needs --repo or --from-file".to_string(),
            );
        } else if std::env::var_os(&config.source.token_env).is_none() {
            warnings.push(format!(
                "{} is not set; requests are unauthenticated and rate limited",
                config.source.token_env
            ));
        }
    }

    if let Some(card) = &config.special.card
        && NaiveDate::parse_from_str(&card.since, SINCE_FORMAT).is_err()
    {
        warnings.push(format!(
            "special.card.since {:?} is not a YYYY.MM.DD date; the days counter will be blank",
            card.since
        ));
    }

    if !config.search.enabled {
        tracing::debug!("search disabled, index will not be written");
    }

    warnings
}

fn check_templates(config: &SiteConfig, result: &mut ValidationResult) {
    let templates = match TemplateRegistry::from_config(config) {
        Ok(t) => {
            println!("  ✓ Templates valid");
            t
        }
        Err(e) => {
            result.add_error(format!("Template error: {e}"));
            println!("  ✗ Templates invalid: {e}");
            return;
        }
    };

    match Renderer::new(config, &templates) {
        Ok(_) => println!("  ✓ Syntax theme {:?} available", config.build.syntax_theme),
        Err(e) => {
            result.add_error(format!("Theme error: {e}"));
            println!("  ✗ {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("issuesite.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_validation_result() {
        let mut result = ValidationResult::default();
        assert!(!result.has_errors());
        assert!(!result.has_warnings());

        result.add_error("bad");
        result.add_warning("meh");
        assert!(result.has_errors());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_check_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[site]\ntitle = \"Notes\"\n\n[source]\nrepo = \"octo/notes\"\n",
        );
        assert!(run(&path, false).is_ok());
    }

    #[test]
    fn test_check_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("missing.toml"), false).is_err());
    }

    #[test]
    fn test_check_unknown_theme() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[site]\ntitle = \"Notes\"\n\n[build]\nsyntax_theme = \"no-such-theme\"\n",
        );
        assert!(run(&path, false).is_err());
    }

    #[test]
    fn test_check_broken_template_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("article.html"), "<h1>{{ title </h1>").unwrap();
        let path = write_config(
            dir.path(),
            "[site]\ntitle = \"Notes\"\n\n[templates]\narticle = \"article.html\"\n",
        );
        assert!(run(&path, false).is_err());
    }

    #[test]
    fn test_check_strict_fails_on_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[site]\ntitle = \"Notes\"\n");

        // No repo configured is only a warning.
        assert!(run(&path, false).is_ok());
        assert!(run(&path, true).is_err());
    }

    #[test]
    fn test_quick_validate_bad_since() {
        let mut config = SiteConfig::with_title("Notes");
        config.special.card = Some(issuesite_core::config::SpecialCard {
            info: "about".to_string(),
            copyright: "me".to_string(),
            since: "last spring".to_string(),
            others: String::new(),
        });

        let warnings = quick_validate(&config, true);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("last spring"));
    }

    #[test]
    fn test_quick_validate_offline_skips_source() {
        let config = SiteConfig::with_title("Notes");
        assert!(quick_validate(&config, true).is_empty());
        assert!(!quick_validate(&config, false).is_empty());
    }
}
