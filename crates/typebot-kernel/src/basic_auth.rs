use crate::key_value::KeyValueMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Pulls `Authorization: Basic user:pass` out of the headers.
///
/// Only the first authorization header mentioning `basic` is considered. A
/// value without `:` is an opaque token and stays in the headers.
pub fn extract_basic_auth(headers: &KeyValueMap) -> (KeyValueMap, Option<BasicAuth>) {
    let found = headers.iter().enumerate().find(|(_, (key, value))| {
        key.eq_ignore_ascii_case("authorization") && value.to_ascii_lowercase().contains("basic")
    });
    let Some((index, (_, value))) = found else {
        return (headers.clone(), None);
    };

    let credentials = match value.to_ascii_lowercase().find("basic") {
        Some(start) => value[start + "basic".len()..].trim_start(),
        None => value,
    };
    let Some((username, password)) = credentials.split_once(':') else {
        return (headers.clone(), None);
    };

    let auth = BasicAuth {
        username: username.to_string(),
        password: password.to_string(),
    };
    let mut remaining = headers.clone();
    remaining.remove_at(index);
    (remaining, Some(auth))
}
