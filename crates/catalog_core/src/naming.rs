/// Word separators accepted in source directory names.
const WORD_SEPARATORS: [char; 2] = ['_', '-'];

/// Normalizes a directory basename to the PascalCase artifact name used as a
/// template placeholder (`model_build` -> `ModelBuild`).
///
/// The result must be a non-empty ASCII identifier starting with a letter. On
/// failure the offending (partially normalized) name is returned.
pub fn logical_artifact_name(basename: &str) -> Result<String, String> {
    let name: String = basename
        .split(&WORD_SEPARATORS[..])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();

    if is_artifact_identifier(&name) {
        Ok(name)
    } else if name.is_empty() {
        Err(basename.to_string())
    } else {
        Err(name)
    }
}

pub fn is_artifact_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_snake_and_kebab_case() {
        assert_eq!(logical_artifact_name("model_build").as_deref(), Ok("ModelBuild"));
        assert_eq!(logical_artifact_name("feature-repo").as_deref(), Ok("FeatureRepo"));
        assert_eq!(
            logical_artifact_name("demo__workspace_").as_deref(),
            Ok("DemoWorkspace")
        );
    }

    #[test]
    fn keeps_inner_casing_of_words() {
        assert_eq!(logical_artifact_name("mlOps_deploy").as_deref(), Ok("MlOpsDeploy"));
    }

    #[test]
    fn rejects_non_identifier_characters() {
        assert_eq!(logical_artifact_name("model.build"), Err("Model.build".to_string()));
        assert_eq!(logical_artifact_name("model build"), Err("Model build".to_string()));
    }

    #[test]
    fn rejects_names_that_do_not_start_with_a_letter() {
        assert!(logical_artifact_name("2_stage").is_err());
        assert_eq!(logical_artifact_name("__"), Err("__".to_string()));
    }

    #[test]
    fn rejects_non_ascii_names() {
        assert!(logical_artifact_name("modèle").is_err());
    }
}
