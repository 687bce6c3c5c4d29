// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Welcome-message template resolution.
//!
//! Templates use `{{path}}` or `{{path|fallback}}` placeholders. A path is
//! looked up first in the thread's contact fields, then in the session's
//! customer fields, then against the identity keys `customer.firstName`,
//! `customer.lastName` and `customer.fullName`. The first non-empty value
//! wins; otherwise the fallback; otherwise the empty string.

use parlor_core::CustomerIdentity;

use crate::fields::FieldBag;

/// Resolves all placeholders in `template`.
pub fn resolve_template(
    template: &str,
    contact_fields: &FieldBag,
    customer_fields: &FieldBag,
    customer: Option<&CustomerIdentity>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                out.push_str(&resolve_placeholder(
                    &after[..end],
                    contact_fields,
                    customer_fields,
                    customer,
                ));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder, emit it verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(
    inner: &str,
    contact_fields: &FieldBag,
    customer_fields: &FieldBag,
    customer: Option<&CustomerIdentity>,
) -> String {
    let (path, fallback) = match inner.split_once('|') {
        Some((path, fallback)) => (path.trim(), fallback.trim()),
        None => (inner.trim(), ""),
    };
    lookup(path, contact_fields, customer_fields, customer)
        .unwrap_or_else(|| fallback.to_string())
}

fn lookup(
    path: &str,
    contact_fields: &FieldBag,
    customer_fields: &FieldBag,
    customer: Option<&CustomerIdentity>,
) -> Option<String> {
    if let Some(value) = contact_fields.value(path) {
        return Some(value.to_string());
    }
    if let Some(value) = customer_fields.value(path) {
        return Some(value.to_string());
    }
    let customer = customer?;
    let value = match path {
        "customer.firstName" => customer.first_name.clone()?,
        "customer.lastName" => customer.last_name.clone()?,
        "customer.fullName" => customer.full_name(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}
