use crate::config::PipelineConfig;

const OPTIONAL_KEYS_HELP: &str = "\
# Optional settings:
#
# Directory or URL prefix holding already published COGs; matching COGs are
# reused rather than recreated. Relative paths are relative to this file.
# cog_check_href = \"https://example.blob.core.windows.net/nclimgrid/cogs\"
#
# Query-string token appended to remote HREFs before reading or probing them.
# read_token = \"sv=...&sig=...\"
";

pub fn default_config_toml() -> String {
    let default_cfg = PipelineConfig::default();
    let s = toml::to_string_pretty(&default_cfg)
        .expect("failed to serialize the default pipeline configuration as TOML - this is a bug");
    format!("{s}\n{OPTIONAL_KEYS_HELP}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let text = default_config_toml();
        let cfg: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert!(text.contains("# cog_check_href"));
    }
}
