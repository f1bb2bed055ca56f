//! `open ... close` token scanning (`#{...}` placeholders)

use crate::error::{BatisError, BatisResult};

/// Replaces every `open content close` token in `text` with the handler's output.
///
/// A backslash directly before `open` escapes it; the backslash is dropped
/// and the token is copied through literally.
pub(crate) fn replace_tokens<F>(
    text: &str,
    open: &str,
    close: &str,
    mut handler: F,
) -> BatisResult<String>
where
    F: FnMut(&str) -> BatisResult<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        if start > 0 && rest[..start].ends_with('\\') {
            out.push_str(&rest[..start - 1]);
            out.push_str(open);
            rest = &rest[start + open.len()..];
            continue;
        }

        out.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];
        let end = after_open.find(close).ok_or_else(|| {
            BatisError::Binding(format!("unterminated '{open}' token in: {text}"))
        })?;
        out.push_str(&handler(&after_open[..end])?);
        rest = &after_open[end + close.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Property name of a placeholder body: `#{id, jdbcType=INTEGER}` → `id`.
pub(crate) fn property_name(content: &str) -> &str {
    content.split(',').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_all_tokens() {
        let out = replace_tokens("a = #{a} AND b = #{ b }", "#{", "}", |c| {
            Ok(format!("<{}>", c.trim()))
        })
        .unwrap();
        assert_eq!(out, "a = <a> AND b = <b>");
    }

    #[test]
    fn escaped_open_is_literal() {
        let out = replace_tokens(r"x = \#{a} y = #{b}", "#{", "}", |_| Ok("?".to_string())).unwrap();
        assert_eq!(out, "x = #{a} y = ?");
    }

    #[test]
    fn unterminated_token_fails() {
        assert!(replace_tokens("a = #{a", "#{", "}", |_| Ok(String::new())).is_err());
    }

    #[test]
    fn property_name_strips_options() {
        assert_eq!(property_name(" id , jdbcType=INTEGER"), "id");
        assert_eq!(property_name("name"), "name");
    }
}
