//! Tests for the breadth-first dependency resolver
//!
//! These run the resolver against an in-memory source client, so they cover
//! the walk itself (deduplication, overrides, failure policy and the cycle
//! ceiling) without any network access.

mod test_utils;

use packsmith::{DependencyResolver, Error};
use test_utils::{
    modrinth_record, pack_with_loader, pack_with_records, project, simple_project, MockFile,
    MockSourceClient,
};

fn ids(resolved: &[packsmith::ResolvedDependency]) -> Vec<&str> {
    resolved.iter().map(|d| d.project.id.as_str()).collect()
}

// ============================================================================
// Basic walks
// ============================================================================

mod walks {
    use super::*;

    #[test]
    fn test_no_dependencies_makes_no_requests() {
        let client = MockSourceClient::modrinth();
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert!(resolved.is_empty());
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_transitive_dependencies_are_collected() {
        let client = MockSourceClient::modrinth()
            .with_project(simple_project("B", &["C"]))
            .with_project(simple_project("C", &[]));
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("B").build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["B", "C"]);
        assert_eq!(resolved[1].file.filename, "C.jar");
    }

    #[test]
    fn test_shared_dependency_is_resolved_once() {
        let client = MockSourceClient::modrinth()
            .with_project(simple_project("B", &["D"]))
            .with_project(simple_project("C", &["D"]))
            .with_project(simple_project("D", &[]));
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar")
            .depends_on("B")
            .depends_on("C")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["B", "C", "D"]);
        let requests = client.requests.borrow();
        assert_eq!(requests[1], vec!["D".to_string()]);
    }

    #[test]
    fn test_cycle_back_to_root_terminates() {
        let client = MockSourceClient::modrinth().with_project(simple_project("B", &["A"]));
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("A-file", "a.jar").depends_on("B").build();

        let resolved = DependencyResolver::new(&client)
            .resolve("A", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["B"]);
        // The second cycle had nothing left to fetch
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn test_version_dependency_resolves_owning_project() {
        let client = MockSourceClient::modrinth().with_project(simple_project("C", &[]));
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar")
            .depends_on_version("C-file")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["C"]);
    }
}

// ============================================================================
// Installed content and overrides
// ============================================================================

mod installed {
    use super::*;

    #[test]
    fn test_installed_projects_are_not_fetched() {
        let client = MockSourceClient::modrinth().with_project(simple_project("LIB", &[]));
        let pack = pack_with_records(vec![modrinth_record("fabric-api", "P7dR8mSH", "v1")]);
        let root = MockFile::new("root-file", "root.jar")
            .depends_on("P7dR8mSH")
            .depends_on("LIB")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["LIB"]);
        assert_eq!(client.requests.borrow()[0], vec!["LIB".to_string()]);
    }

    #[test]
    fn test_installed_slug_counts_as_installed() {
        let client = MockSourceClient::modrinth();
        let pack = pack_with_records(vec![modrinth_record("fabric-api", "P7dR8mSH", "v1")]);
        let root = MockFile::new("root-file", "root.jar")
            .depends_on("fabric-api")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert!(resolved.is_empty());
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_quilt_pack_gets_quilted_fabric_api() {
        let qfapi = project(
            "qvIfYCYJ",
            "qsl",
            vec![MockFile::new("qfapi-file", "qfapi.jar")
                .loaders(&["quilt"])
                .build()],
        );
        let client = MockSourceClient::modrinth().with_project(qfapi);
        let pack = pack_with_loader(Some("quilt"));
        let root = MockFile::new("root-file", "root.jar")
            .depends_on("P7dR8mSH")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["qvIfYCYJ"]);
        assert_eq!(client.requests.borrow()[0], vec!["qvIfYCYJ".to_string()]);
    }

    #[test]
    fn test_fabric_pack_keeps_fabric_api() {
        let client =
            MockSourceClient::modrinth().with_project(simple_project("P7dR8mSH", &[]));
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar")
            .depends_on("P7dR8mSH")
            .build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["P7dR8mSH"]);
    }
}

// ============================================================================
// Failure policy and the cycle ceiling
// ============================================================================

mod failures {
    use super::*;

    #[test]
    fn test_first_cycle_failure_aborts() {
        let client = MockSourceClient::modrinth()
            .with_project(simple_project("B", &[]))
            .failing_on("B");
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("B").build();

        let err = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap_err();

        assert!(matches!(err, Error::ExternalFailure(_)), "got {:?}", err);
    }

    #[test]
    fn test_later_cycle_failure_keeps_earlier_results() {
        let client = MockSourceClient::modrinth()
            .with_project(simple_project("B", &["C"]))
            .with_project(simple_project("C", &[]))
            .failing_on("C");
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("B").build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(ids(&resolved), vec!["B"]);
    }

    #[test]
    fn test_project_without_acceptable_file_is_skipped() {
        let old = project(
            "OLD",
            "old",
            vec![MockFile::new("old-file", "old.jar")
                .game_versions(&["1.16.5"])
                .depends_on("NEVER")
                .build()],
        );
        let client = MockSourceClient::modrinth().with_project(old);
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("OLD").build();

        let resolved = DependencyResolver::new(&client)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert!(resolved.is_empty());
        assert_eq!(client.request_count(), 1);
    }

    fn chain(length: usize) -> MockSourceClient {
        (0..length).fold(MockSourceClient::modrinth(), |client, i| {
            let id = format!("C{}", i);
            let next = format!("C{}", i + 1);
            let deps: Vec<&str> = if i + 1 < length {
                vec![next.as_str()]
            } else {
                vec![]
            };
            client.with_project(simple_project(&id, &deps))
        })
    }

    #[test]
    fn test_deep_chain_exceeds_cycle_ceiling() {
        let client = chain(30);
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("C0").build();

        let err = DependencyResolver::with_max_cycles(&client, 20)
            .resolve("ROOT", &root, &pack)
            .unwrap_err();

        assert!(matches!(err, Error::IntegrityViolation(_)), "got {:?}", err);
        assert!(err.to_string().contains("max_cycles"));
        assert_eq!(client.request_count(), 20);
    }

    #[test]
    fn test_raised_ceiling_resolves_deep_chain() {
        let client = chain(30);
        let pack = pack_with_loader(Some("fabric"));
        let root = MockFile::new("root-file", "root.jar").depends_on("C0").build();

        let resolved = DependencyResolver::with_max_cycles(&client, 40)
            .resolve("ROOT", &root, &pack)
            .unwrap();

        assert_eq!(resolved.len(), 30);
        assert_eq!(resolved[29].project.id, "C29");
    }
}
