//! Search command - query a built search index

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use issuesite_core::SiteConfig;
use issuesite_search::{SearchIndex, SearchIndexEntry};

/// Run the search command.
///
/// Reads the index the last build wrote and prints the best matches using
/// the same matching rules as the site's search box.
pub fn run(config_path: &Path, output: Option<&Path>, query: &str, limit: usize) -> Result<()> {
    let config = SiteConfig::load_with_env(config_path).wrap_err("Failed to load configuration")?;
    let path = index_path(&config, output);

    tracing::debug!(path = %path.display(), query, "Searching index");

    let index = SearchIndex::read_from_file(&path)
        .wrap_err_with(|| format!("No search index at {}; run build first", path.display()))?;

    let hits = top_hits(&index, query, limit);
    if hits.is_empty() {
        println!("No results for {query:?}");
        return Ok(());
    }

    for entry in hits {
        println!("#{} {}", entry.id, entry.title);
        println!("    {}", entry.url);
        if !entry.excerpt.is_empty() {
            println!("    {}", entry.excerpt);
        }
    }

    Ok(())
}

fn index_path(config: &SiteConfig, output: Option<&Path>) -> PathBuf {
    let dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => config.resolve(&config.build.output_dir),
    };
    dir.join(&config.search.file_name)
}

fn top_hits<'a>(index: &'a SearchIndex, query: &str, limit: usize) -> Vec<&'a SearchIndexEntry> {
    let mut hits = index.search(query);
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const INDEX: &str = r#"[
        {"id": 1, "title": "Async Rust", "excerpt": "futures and tasks", "labels": ["rust"], "url": "articles/1.html"},
        {"id": 2, "title": "Gardening", "excerpt": "rust on tools", "labels": [], "url": "articles/2.html"},
        {"id": 3, "title": "Rust macros", "excerpt": "", "labels": ["rust"], "url": "articles/3.html"}
    ]"#;

    #[test]
    fn test_index_path_uses_output_override() {
        let config = SiteConfig::with_title("Notes");
        let path = index_path(&config, Some(Path::new("/srv/site")));
        assert_eq!(path, PathBuf::from("/srv/site/search-index.json"));
    }

    #[test]
    fn test_top_hits_limit() {
        let index = SearchIndex::from_json(INDEX).unwrap();
        let hits = top_hits(&index, "rust", 2);
        assert_eq!(hits.len(), 2);
        // Title matches rank first.
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 3);
    }

    #[test]
    fn test_run_against_written_index() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("issuesite.toml");
        fs::write(&config_path, "[site]\ntitle = \"Notes\"\n").unwrap();
        let out = dir.path().join("public");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("search-index.json"), INDEX).unwrap();

        assert!(run(&config_path, Some(&out), "macros", 10).is_ok());
        assert!(run(&config_path, Some(&out), "nothing-matches", 10).is_ok());
    }

    #[test]
    fn test_run_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("issuesite.toml");
        fs::write(&config_path, "[site]\ntitle = \"Notes\"\n").unwrap();

        assert!(run(&config_path, Some(&dir.path().join("empty")), "rust", 10).is_err());
    }
}
