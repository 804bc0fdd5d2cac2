use crate::{Record, ResourceSchema};
use std::collections::BTreeMap;
use tracing::warn;

/// Case-insensitive substring search across the schema's search fields.
/// An absent or blank term matches every row.
pub fn matches_search<R: Record>(schema: &ResourceSchema<R>, term: Option<&str>, row: &R) -> bool {
    let term = match term.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => return true,
    };

    schema.search_fields().iter().any(|field| {
        field
            .text(row)
            .is_some_and(|text| text.to_lowercase().contains(&term))
    })
}

/// Every filter with a non-empty value must hold. Keys the schema does not
/// declare never reject a row.
pub fn matches_filters<R: Record>(
    schema: &ResourceSchema<R>,
    filters: &BTreeMap<String, String>,
    row: &R,
) -> bool {
    let mut unknown: Vec<&str> = Vec::new();
    let mut matched = true;

    for (key, value) in filters {
        if value.trim().is_empty() {
            continue;
        }
        match schema.filter(key) {
            Some(filter) => {
                if !filter.matches(row, value) {
                    matched = false;
                    break;
                }
            }
            None => unknown.push(key),
        }
    }

    if !unknown.is_empty() {
        warn!(
            resource = schema.namespace(),
            keys = ?unknown,
            "Ignoring unknown filter keys"
        );
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: String,
        first: String,
        last: String,
        email: Option<String>,
        role: String,
    }

    impl Record for User {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn schema() -> ResourceSchema<User> {
        ResourceSchema::builder("users")
            .search_field("full_name", |u: &User| Some(format!("{} {}", u.first, u.last)))
            .search_field("email", |u: &User| u.email.clone())
            .equals_filter("role", |u: &User| Some(u.role.clone()))
            .build()
    }

    fn alice() -> User {
        User {
            id: "1".into(),
            first: "Alice".into(),
            last: "Smith".into(),
            email: None,
            role: "instructor".into(),
        }
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let schema = schema();
        assert!(matches_search(&schema, None, &alice()));
        assert!(matches_search(&schema, Some(""), &alice()));
        assert!(matches_search(&schema, Some("   "), &alice()));
    }

    #[test]
    fn test_search_is_case_insensitive_over_derived_fields() {
        let schema = schema();
        assert!(matches_search(&schema, Some("SMITH"), &alice()));
        assert!(matches_search(&schema, Some("ice sm"), &alice()));
        assert!(!matches_search(&schema, Some("jones"), &alice()));
    }

    #[test]
    fn test_search_skips_missing_fields() {
        let schema = schema();
        let mut u = alice();
        u.email = Some("a.smith@school.example".into());
        assert!(matches_search(&schema, Some("school"), &u));
        assert!(!matches_search(&schema, Some("school"), &alice()));
    }

    #[test]
    fn test_filters() {
        let schema = schema();
        let mut filters = BTreeMap::new();
        assert!(matches_filters(&schema, &filters, &alice()));

        filters.insert("role".to_string(), "instructor".to_string());
        assert!(matches_filters(&schema, &filters, &alice()));

        filters.insert("role".to_string(), "admin".to_string());
        assert!(!matches_filters(&schema, &filters, &alice()));

        filters.insert("role".to_string(), "".to_string());
        assert!(matches_filters(&schema, &filters, &alice()));
    }

    #[test]
    fn test_unknown_filter_key_is_vacuously_true() {
        let schema = schema();
        let mut filters = BTreeMap::new();
        filters.insert("rol".to_string(), "admin".to_string());
        assert!(matches_filters(&schema, &filters, &alice()));
    }

    #[test]
    fn test_unknown_filter_key_logs_warning() {
        let schema = schema();
        let mut filters = BTreeMap::new();
        filters.insert("role".to_string(), "instructor".to_string());
        filters.insert("dept".to_string(), "science".to_string());

        let logs = capture_logs(|| {
            assert!(matches_filters(&schema, &filters, &alice()));
        });
        assert!(logs.contains("WARN"));
        assert!(logs.contains("Ignoring unknown filter keys"));
        assert!(logs.contains("users"));
        assert!(logs.contains("dept"));

        filters.remove("dept");
        let logs = capture_logs(|| {
            assert!(matches_filters(&schema, &filters, &alice()));
        });
        assert!(!logs.contains("Ignoring unknown filter keys"));
    }

    fn capture_logs<F>(f: F) -> String
    where
        F: FnOnce(),
    {
        use std::io::Write;
        use std::sync::{Arc, Mutex};
        use tracing::subscriber::with_default;
        use tracing_subscriber::EnvFilter;

        #[derive(Clone)]
        struct BufferWriter {
            inner: Arc<Mutex<Vec<u8>>>,
        }

        impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufferWriter {
            type Writer = BufferGuard;

            fn make_writer(&'a self) -> Self::Writer {
                BufferGuard {
                    inner: self.inner.clone(),
                }
            }
        }

        struct BufferGuard {
            inner: Arc<Mutex<Vec<u8>>>,
        }

        impl Write for BufferGuard {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.inner.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let writer = BufferWriter {
            inner: Arc::new(Mutex::new(Vec::new())),
        };
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_ansi(false)
            .without_time()
            .with_writer(writer.clone())
            .finish();

        with_default(subscriber, f);

        let bytes = writer.inner.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }
}
