use std::path::Path;

pub const PREFIX_DIGITS: usize = 3;
pub const MAX_ORDER: u32 = 999;

pub fn parse_prefixed(name: &str) -> Option<(u32, &str)> {
    let digits = name.get(..PREFIX_DIGITS)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rest = &name[PREFIX_DIGITS..];
    let base = rest.trim_start();
    if base.len() == rest.len() || base.is_empty() {
        return None;
    }
    let order = digits.parse().ok()?;
    Some((order, base))
}

/// Joins `order` and `base` with a single space. Orders above [`MAX_ORDER`]
/// produce a four-digit prefix that [`parse_prefixed`] no longer recognises.
pub fn format_prefixed(order: u32, base: &str) -> String {
    format!("{:03} {}", order, base)
}

pub fn base_name(name: &str) -> &str {
    parse_prefixed(name).map(|(_, base)| base).unwrap_or(name)
}

pub fn effective_order(name: &str) -> u32 {
    parse_prefixed(name).map(|(order, _)| order).unwrap_or(0)
}

pub fn with_order(name: &str, order: u32) -> String {
    format_prefixed(order, base_name(name))
}

pub fn title_from_base(base: &str) -> String {
    Path::new(base)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| base.to_string())
}
