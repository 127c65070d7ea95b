//! Dotted field path access on BSON documents.

use bson::{Bson, Document};

/// Resolves `a.b.c` through nested documents. Numeric segments index arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Sets `path`, creating intermediate documents. Fails when a non-document is in the way.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), String> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(format!("cannot create field {rest} inside non-document {head}")),
            }
        }
    }
}

/// Removes `path` and returns the previous value.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

/// Strips the `$` prefix used by field references inside pipeline stages.
pub(crate) fn field_reference(field: &str) -> &str {
    field.strip_prefix('$').unwrap_or(field)
}
