// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Trivial templating engine for server-rendered pages.
//!
//! Templates are plain strings with `%key%` placeholders.  Values are inserted verbatim, so any
//! value that comes from user input must go through `escape` first.

/// Performs various named string replacements in `input` based on `replacements`.
///
/// The `input` string can have `%key%` strings in it where `key` must appear in `replacements` and
/// which will be replaced by its corresponding value.  Raw `%` characters can be escaped via `%%`
/// and nested expansions are not supported, which means that replacement values can safely
/// contain `%` characters.
///
/// Templates are compiled into the binary, so referencing an undefined key is a programming error
/// and panics.
pub fn apply(input: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(input.len());
    let mut partial_key: Option<String> = None;
    for ch in input.chars() {
        if ch == '%' {
            match partial_key.take() {
                Some(key) if key.is_empty() => output.push('%'),
                Some(key) => {
                    let mut values = replacements.iter().filter(|(k, _)| *k == key);
                    let value = values
                        .next()
                        .unwrap_or_else(|| panic!("No replacement for {} but it must exist", key));
                    assert!(values.next().is_none(), "Found two values for replacement {}", key);
                    output.push_str(value.1);
                }
                None => partial_key = Some(String::new()),
            }
        } else {
            match partial_key.as_mut() {
                Some(k) => k.push(ch),
                None => output.push(ch),
            }
        }
    }
    assert!(partial_key.is_none(), "Unterminated replacement key in template");
    output
}

/// Escapes `text` so that it can be safely inserted in HTML content and attribute values.
pub fn escape(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            ch => output.push(ch),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_empty() {
        assert_eq!("", apply("", &[]));
    }

    #[test]
    fn test_apply_none() {
        assert_eq!("<p>width: 100%</p>", apply("<p>width: 100%%</p>", &[]));
    }

    #[test]
    fn test_apply_some() {
        let replacements = &[("title", "Cozy cabin"), ("price", "1200")];
        assert_eq!(
            "<h1>Cozy cabin</h1><p>1200 per night</p>",
            apply("<h1>%title%</h1><p>%price% per night</p>", replacements)
        );
        assert_eq!("Cozy cabin1200", apply("%title%%price%", replacements));
    }

    #[test]
    fn test_apply_no_nested_replacements() {
        let replacements = &[("title", "100% %price% off")];
        assert_eq!("<h1>100% %price% off</h1>", apply("<h1>%title%</h1>", replacements));
    }

    #[test]
    #[should_panic(expected = "No replacement for missing")]
    fn test_apply_missing_key() {
        apply("%missing%", &[]);
    }

    #[test]
    #[should_panic(expected = "Unterminated")]
    fn test_apply_unterminated_key() {
        apply("50% off", &[]);
    }

    #[test]
    fn test_escape() {
        assert_eq!("plain text", escape("plain text"));
        assert_eq!(
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#39;y&#39;&lt;/script&gt;",
            escape("<script>alert(\"x\") & 'y'</script>")
        );
    }
}
