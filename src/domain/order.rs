//! Best-effort topological ordering of models by declared dependencies.

use std::collections::HashSet;

use tracing::debug;

use super::model::Model;

/// Orders models so that every model follows the models it depends on.
///
/// Models are moved to the output once all of their declared dependencies
/// are already there, scanning repeatedly until a full scan makes no
/// progress. Whatever remains (cycles, or dependencies that are not in the
/// input at all) is appended in its original relative order. This never
/// fails.
#[must_use]
pub fn order_by_dependencies(models: Vec<Model>) -> Vec<Model> {
    let mut ordered: Vec<Model> = Vec::with_capacity(models.len());
    let mut placed: HashSet<String> = HashSet::with_capacity(models.len());
    let mut remaining = models;

    loop {
        let before = remaining.len();
        let mut deferred = Vec::with_capacity(before);

        for model in remaining {
            let ready = model
                .dependencies()
                .iter()
                .all(|dep| placed.contains(&dep.namespace_uri));
            if ready {
                placed.insert(model.namespace_uri.clone());
                ordered.push(model);
            } else {
                deferred.push(model);
            }
        }

        remaining = deferred;
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }

    if !remaining.is_empty() {
        debug!(
            unordered = remaining.len(),
            "appending models with unsatisfied or circular dependencies"
        );
    }
    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequiredModel;

    fn model(uri: &str, deps: &[&str]) -> Model {
        let mut model = Model::new(uri);
        for dep in deps {
            model.add_dependency(RequiredModel::new(*dep)).unwrap();
        }
        model
    }

    fn uris(models: &[Model]) -> Vec<&str> {
        models.iter().map(|m| m.namespace_uri.as_str()).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let ordered = order_by_dependencies(vec![
            model("urn:c", &["urn:b"]),
            model("urn:b", &["urn:a"]),
            model("urn:a", &[]),
        ]);
        assert_eq!(uris(&ordered), ["urn:a", "urn:b", "urn:c"]);
    }

    #[test]
    fn independent_models_keep_their_order() {
        let ordered = order_by_dependencies(vec![
            model("urn:z", &[]),
            model("urn:y", &[]),
            model("urn:x", &["urn:z"]),
        ]);
        assert_eq!(uris(&ordered), ["urn:z", "urn:y", "urn:x"]);
    }

    #[test]
    fn cycles_are_appended_in_original_order() {
        let ordered = order_by_dependencies(vec![
            model("urn:p", &["urn:q"]),
            model("urn:a", &[]),
            model("urn:q", &["urn:p"]),
            model("urn:b", &["urn:a"]),
        ]);
        assert_eq!(uris(&ordered), ["urn:a", "urn:b", "urn:p", "urn:q"]);
    }

    #[test]
    fn unresolvable_dependencies_are_appended() {
        let ordered = order_by_dependencies(vec![
            model("urn:c", &["urn:missing"]),
            model("urn:a", &[]),
        ]);
        assert_eq!(uris(&ordered), ["urn:a", "urn:c"]);
    }

    #[test]
    fn ordering_is_idempotent() {
        let once = order_by_dependencies(vec![
            model("urn:d", &["urn:c", "urn:a"]),
            model("urn:p", &["urn:q"]),
            model("urn:c", &["urn:b"]),
            model("urn:q", &["urn:p"]),
            model("urn:b", &["urn:a"]),
            model("urn:a", &[]),
        ]);
        let twice = order_by_dependencies(once.clone());
        assert_eq!(uris(&once), uris(&twice));
    }

    #[test]
    fn every_present_dependency_precedes_its_dependant() {
        let ordered = order_by_dependencies(vec![
            model("urn:e", &["urn:d", "urn:b"]),
            model("urn:d", &["urn:c"]),
            model("urn:b", &["urn:a"]),
            model("urn:c", &["urn:a", "urn:b"]),
            model("urn:a", &[]),
        ]);
        for (index, model) in ordered.iter().enumerate() {
            for dep in model.dependencies() {
                let position = ordered
                    .iter()
                    .position(|m| m.namespace_uri == dep.namespace_uri)
                    .unwrap();
                assert!(position < index, "{} must follow {}", model.namespace_uri, dep.namespace_uri);
            }
        }
    }
}
