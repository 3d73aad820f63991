//! Operator guidance printed after registration
//!
//! DNS binding stays manual; this renders the exact command to run.

use minijinja::{Environment, context};
use relay_core::{RelayError, Result};

const GUIDANCE_TEMPLATE: &str = "\
Tunnel '{{ name }}' registered with id {{ id }}.
Configuration {{ config_file }} updated ({{ replacements }} replacement(s), backup at {{ backup }}).

Next step (manual): bind a public hostname to the tunnel:
  {{ binary }} tunnel route dns {{ name }} {% if hostname %}{{ hostname }}{% else %}<your-hostname>{% endif %}

The tunnel forwards to {{ local_url }}. Start the server and the tunnel with:
  stock-relay run
";

/// Values substituted into the guidance text
#[derive(Debug, Clone)]
pub struct GuidanceContext<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub binary: &'a str,
    pub config_file: String,
    pub backup: String,
    pub replacements: usize,
    pub hostname: Option<&'a str>,
    pub local_url: String,
}

/// Render the post-registration instructions
pub fn render_guidance(ctx: &GuidanceContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("guidance", GUIDANCE_TEMPLATE)
        .map_err(|e| RelayError::Template(e.to_string()))?;

    env.get_template("guidance")
        .and_then(|template| {
            template.render(context! {
                name => ctx.name,
                id => ctx.id,
                binary => ctx.binary,
                config_file => &ctx.config_file,
                backup => &ctx.backup,
                replacements => ctx.replacements,
                hostname => ctx.hostname,
                local_url => &ctx.local_url,
            })
        })
        .map_err(|e| RelayError::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(hostname: Option<&str>) -> GuidanceContext<'_> {
        GuidanceContext {
            name: "stock-analysis",
            id: "6ff42ae2-765d-4adf-8112-31c55c1551ef",
            binary: "cloudflared",
            config_file: "config.yml".to_string(),
            backup: "config.yml.bak".to_string(),
            replacements: 2,
            hostname,
            local_url: "http://localhost:8001".to_string(),
        }
    }

    #[test]
    fn test_guidance_with_hostname() {
        let text = render_guidance(&ctx(Some("stocks.example.com"))).unwrap();
        assert!(text.contains("cloudflared tunnel route dns stock-analysis stocks.example.com"));
        assert!(text.contains("http://localhost:8001"));
        assert!(text.contains("2 replacement(s)"));
    }

    #[test]
    fn test_guidance_placeholder_hostname() {
        let text = render_guidance(&ctx(None)).unwrap();
        assert!(text.contains("route dns stock-analysis <your-hostname>"));
    }
}
