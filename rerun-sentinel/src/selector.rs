/// Represents ways to locate an element in the watched document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by tag name (custom elements included, e.g. `ms-chat-turn`)
    Tag(String),
    /// Select by element id
    Id(String),
    /// Select by a single class name
    ClassName(String),
    /// Select by visible text content (substring match over the subtree)
    Text(String),
    /// Select by attribute substring match, optionally narrowed to a tag
    AttrContains {
        tag: Option<String>,
        name: String,
        needle: String,
    },
    /// Chain multiple selectors, each stage scoped to the previous matches
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        // `tag[attr*=needle]` / `[attr*=needle]` fuzzy attribute forms
        if s.ends_with(']') {
            if let Some(sel) = parse_attr_contains(s) {
                return sel;
            }
            return Selector::Invalid(format!(
                "Unparseable attribute selector: \"{s}\". Expected tag[attr*=needle] or [attr*=needle]."
            ));
        }

        match s {
            _ if s.starts_with('.') => Selector::ClassName(s[1..].to_string()),
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            _ if s.starts_with("text:") => Selector::Text(s[5..].to_string()),
            _ if s.to_lowercase().starts_with("class:") => {
                let parts: Vec<&str> = s.splitn(2, ':').collect();
                Selector::ClassName(parts[1].to_string())
            }
            _ if s.to_lowercase().starts_with("id:") => {
                let parts: Vec<&str> = s.splitn(2, ':').collect();
                Selector::Id(parts[1].to_string())
            }
            _ if s.to_lowercase().starts_with("tag:") => {
                let parts: Vec<&str> = s.splitn(2, ':').collect();
                Selector::Tag(parts[1].to_string())
            }
            _ if is_tag_like(s) => Selector::Tag(s.to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use '.class', '#id', a tag name, \
                 'tag[attr*=needle]', or prefixes 'text:', 'class:', 'id:', 'tag:'."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Parse a configured selector string, flagging unusable ones once up front
/// instead of on every scan pass.
pub(crate) fn parse_checked(s: &str) -> Selector {
    let selector = Selector::from(s);
    if let Selector::Invalid(reason) = &selector {
        tracing::warn!(selector = s, "{reason}");
    }
    selector
}

/// Parse `tag[attr*=needle]` or `[attr*=needle]`; needle quotes are stripped.
fn parse_attr_contains(s: &str) -> Option<Selector> {
    let open = s.find('[')?;
    let body = &s[open + 1..s.len() - 1];
    let (name, needle) = body.split_once("*=")?;
    let name = name.trim();
    let needle = needle.trim().trim_matches('"').trim_matches('\'');
    if name.is_empty() || needle.is_empty() {
        return None;
    }
    let tag = s[..open].trim();
    Some(Selector::AttrContains {
        tag: if tag.is_empty() {
            None
        } else {
            Some(tag.to_string())
        },
        name: name.to_string(),
        needle: needle.to_string(),
    })
}

fn is_tag_like(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
