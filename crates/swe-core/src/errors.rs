/// Map raw error text to a short message for the console.
///
/// `error_history` keeps the full text; this is only what the user sees.
pub fn friendly_message(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("permission denied") || lower.contains("permission") {
        return "Permission denied: check file and directory permissions".into();
    }
    if lower.contains("not found") || lower.contains("no such file") {
        return "Not found: a file, command or resource is missing".into();
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return "Timeout: the operation took too long".into();
    }
    if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("error sending request")
    {
        return "Network error: check connectivity and the model endpoint".into();
    }
    let first = error.lines().next().unwrap_or_default();
    if first.chars().count() > 200 {
        format!("{}...", first.chars().take(200).collect::<String>())
    } else {
        first.to_string()
    }
}
