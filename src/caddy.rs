//! Caddy reverse-proxy configuration.
//!
//! Config files are composed as nested [`ConfigBlock`] lists and rendered
//! with 8-column indentation. The renderer only tracks braces; it does not
//! validate Caddyfile grammar.

use crate::config::{OperatorConfig, ProxyConfig};
use crate::desired::VirtualHost;
use crate::scripts;

/// Indentation step
pub const INDENT: usize = 8;

/// Directory on the host mounted into the proxy container as `/etc/caddy`
pub const CADDY_DIR: &str = "/root/caddy";

/// One element of a config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigBlock {
    Line(String),
    Block(Vec<ConfigBlock>),
}

/// Shorthand for [`ConfigBlock::Line`]
pub fn line(text: impl Into<String>) -> ConfigBlock {
    ConfigBlock::Line(text.into())
}

/// Render `blocks` starting at `indent` columns.
///
/// A line ending in `{` indents the following lines one step until a line
/// consisting solely of `}`. A nested block renders at
/// `indent + INDENT * max(open braces, 1)`.
pub fn render(blocks: &[ConfigBlock], indent: usize) -> String {
    let mut out = Vec::new();
    render_into(blocks, indent, &mut out);
    out.join("\n")
}

fn render_into(blocks: &[ConfigBlock], indent: usize, out: &mut Vec<String>) {
    let mut depth = 0usize;
    for block in blocks {
        match block {
            ConfigBlock::Line(text) => {
                let trimmed = text.trim();
                if trimmed == "}" {
                    depth = depth.saturating_sub(1);
                }
                out.push(format!("{}{}", " ".repeat(indent + INDENT * depth), trimmed));
                if trimmed.ends_with('{') {
                    depth += 1;
                }
            }
            ConfigBlock::Block(inner) => {
                render_into(inner, indent + INDENT * depth.max(1), out);
            }
        }
    }
}

/// Global Caddyfile: ACME email, the `auth_protect` snippet and site imports.
pub fn global_config(operator: &OperatorConfig, proxy: &ProxyConfig) -> Vec<ConfigBlock> {
    let mut blocks = Vec::new();
    if !operator.email.is_empty() {
        blocks.extend([
            line("{"),
            line(format!("email {}", operator.email)),
            line("}"),
        ]);
    }
    blocks.extend([
        line("(auth_protect) {"),
        ConfigBlock::Block(vec![
            line("route {"),
            ConfigBlock::Block(vec![
                line(format!("forward_auth {} {{", proxy.forward_auth)),
                ConfigBlock::Block(vec![
                    line(format!("uri {}", proxy.login_uri)),
                    line("copy_headers Remote-User Remote-Email Remote-Name"),
                ]),
                line("}"),
            ]),
            line("}"),
        ]),
        line("}"),
        line("import sites/*"),
    ]);
    blocks
}

/// Site block for one virtual host.
pub fn site_config(vhost: &VirtualHost) -> Vec<ConfigBlock> {
    let mut blocks = vec![line(format!("{} {{", vhost.host))];
    if vhost.locked {
        blocks.push(line("import auth_protect"));
    }
    blocks.push(ConfigBlock::Block(vec![line(format!(
        "reverse_proxy {}:{}",
        vhost.container, vhost.port
    ))]));
    blocks.push(line("}"));
    blocks
}

pub fn site_path(vhost: &VirtualHost) -> String {
    format!("{CADDY_DIR}/sites/{}.caddy", vhost.host)
}

/// Commands that write the global Caddyfile and (re)start the proxy.
pub fn install_commands(operator: &OperatorConfig, proxy: &ProxyConfig) -> Vec<String> {
    let caddyfile = render(&global_config(operator, proxy), 0);
    vec![
        format!("mkdir -p {CADDY_DIR}/sites"),
        scripts::write_file(&format!("{CADDY_DIR}/Caddyfile"), &caddyfile),
        format!(
            "docker network inspect {net} >/dev/null 2>&1 || docker network create {net}",
            net = proxy.network
        ),
        format!(
            "docker rm -f caddy >/dev/null 2>&1; docker run -d --name caddy --restart always \
--network {} -p 80:80 -p 443:443 -v {CADDY_DIR}:/etc/caddy -v caddy_data:/data {}",
            proxy.network, proxy.image
        ),
    ]
}

/// Commands that write every site file, then format and reload once.
pub fn vhost_commands(vhosts: &[VirtualHost]) -> Vec<String> {
    let mut commands: Vec<String> = vhosts
        .iter()
        .map(|vhost| scripts::write_file(&site_path(vhost), &render(&site_config(vhost), 0)))
        .collect();
    commands.push("docker exec caddy caddy fmt --overwrite /etc/caddy/Caddyfile".to_string());
    commands.push("docker exec caddy caddy reload --config /etc/caddy/Caddyfile".to_string());
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> OperatorConfig {
        OperatorConfig {
            id: "alice".into(),
            email: "alice@example.com".into(),
        }
    }

    fn vhost(locked: bool) -> VirtualHost {
        VirtualHost {
            host: "app.example.com".into(),
            container: "ddev-app-web".into(),
            port: 80,
            locked,
        }
    }

    /// Depth of every rendered line recomputed from braces alone.
    fn brace_depths(text: &str) -> Vec<(usize, usize)> {
        let mut depth = 0usize;
        text.lines()
            .map(|l| {
                let trimmed = l.trim();
                if trimmed == "}" {
                    depth -= 1;
                }
                let leading = l.len() - l.trim_start().len();
                let entry = (leading / INDENT, depth);
                if trimmed.ends_with('{') {
                    depth += 1;
                }
                entry
            })
            .collect()
    }

    #[test]
    fn test_render_global_config() {
        let rendered = render(&global_config(&operator(), &ProxyConfig::default()), 0);
        let expected = "\
{
        email alice@example.com
}
(auth_protect) {
        route {
                forward_auth https://www.devboxui.com {
                        uri /user/login?destination=vhost-auth
                        copy_headers Remote-User Remote-Email Remote-Name
                }
        }
}
import sites/*";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_nesting_round_trip() {
        let rendered = render(&global_config(&operator(), &ProxyConfig::default()), 0);
        for (indent_level, depth) in brace_depths(&rendered) {
            assert_eq!(indent_level, depth);
        }

        let site = render(&site_config(&vhost(true)), 0);
        for (indent_level, depth) in brace_depths(&site) {
            assert_eq!(indent_level, depth);
        }
    }

    #[test]
    fn test_site_config() {
        assert_eq!(
            render(&site_config(&vhost(true)), 0),
            "app.example.com {\n        import auth_protect\n        reverse_proxy ddev-app-web:80\n}"
        );
        assert_eq!(
            render(&site_config(&vhost(false)), 0),
            "app.example.com {\n        reverse_proxy ddev-app-web:80\n}"
        );
    }

    #[test]
    fn test_nested_block_without_open_brace() {
        let blocks = vec![line("a"), ConfigBlock::Block(vec![line("b")]), line("c")];
        assert_eq!(render(&blocks, 2), "  a\n          b\n  c");
    }

    #[test]
    fn test_commands() {
        let install = install_commands(&operator(), &ProxyConfig::default());
        assert_eq!(install[0], "mkdir -p /root/caddy/sites");
        assert!(install[1].starts_with("cat <<'DEVBOX_EOF' > /root/caddy/Caddyfile\n{\n"));
        assert!(install[3].contains("--network ddev_default"));
        assert!(install[3].ends_with("caddy:2"));

        let sync = vhost_commands(&[vhost(false)]);
        assert_eq!(sync.len(), 3);
        assert!(sync[0].contains("> /root/caddy/sites/app.example.com.caddy"));
        assert!(sync[2].contains("caddy reload"));
    }
}
