/// Substitute environment variables in raw config text.
///
/// Supports `${VAR}`, `${VAR:-default}` and `$VAR`. Undefined variables expand
/// to the empty string; a lone `$` is kept.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let expr: String = chars.by_ref().take_while(|&c| c != '}').collect();
            let (name, default) = match expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (expr.as_str(), None),
            };
            match (std::env::var(name), default) {
                (Ok(val), Some(default)) if val.is_empty() => out.push_str(default),
                (Ok(val), _) => out.push_str(&val),
                (Err(_), Some(default)) => out.push_str(default),
                (Err(_), None) => {}
            }
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
        } else if let Ok(val) = std::env::var(&name) {
            out.push_str(&val);
        }
    }
    out
}
