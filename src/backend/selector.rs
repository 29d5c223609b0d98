//! LogQL selector construction from project/service scoping.

/// Build a label-matching selector for the log index from a project name
/// and a service list.
///
/// - no services: `{project="p"}`
/// - one service: `{project="p",service="s"}`
/// - several: `{project="p",service=~"^(s1|s2)$"}` with regex
///   metacharacters in service names escaped.
///
/// Pure and idempotent; the caller is responsible for supplying at least
/// one discriminator.
pub fn build_selector(project: Option<&str>, services: &[String]) -> String {
    let mut matchers = Vec::new();

    if let Some(project) = project {
        matchers.push(format!("project=\"{project}\""));
    }

    match services {
        [] => {}
        [service] => matchers.push(format!("service=\"{service}\"")),
        many => {
            let escaped: Vec<String> = many.iter().map(|s| regex::escape(s)).collect();
            matchers.push(format!("service=~\"^({})$\"", escaped.join("|")));
        }
    }

    format!("{{{}}}", matchers.join(","))
}
