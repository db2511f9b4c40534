//! Property-based tests for placeholder substitution

use certrun::manifest::{self, IMAGE_PLACEHOLDER, PORT_PLACEHOLDER, SUBDOMAIN_PLACEHOLDER};
use proptest::prelude::*;
use tempfile::TempDir;

fn template_strategy() -> impl Strategy<Value = String> {
    let chunk = prop_oneof![
        Just(IMAGE_PLACEHOLDER.to_string()),
        Just(SUBDOMAIN_PLACEHOLDER.to_string()),
        Just(PORT_PLACEHOLDER.to_string()),
        "[a-z:\\- \n]{0,12}",
    ];
    prop::collection::vec(chunk, 0..16).prop_map(|chunks| chunks.concat())
}

proptest! {
    /// No placeholder survives rendering, whatever the values are.
    #[test]
    fn test_no_placeholder_remains(
        template in template_strategy(),
        image in "[a-z0-9./]{1,20}:[a-f0-9]{7}",
        run_id in "[0-9]{1,10}",
        port in 30000u16..32767,
    ) {
        let rendered = manifest::render(&template, &image, &run_id, port);
        prop_assert!(!rendered.contains(IMAGE_PLACEHOLDER));
        prop_assert!(!rendered.contains(SUBDOMAIN_PLACEHOLDER));
        prop_assert!(!rendered.contains(PORT_PLACEHOLDER));
    }

    /// Every placeholder occurrence becomes exactly one copy of its value.
    #[test]
    fn test_each_occurrence_is_substituted(
        images in 0usize..4,
        subdomains in 0usize..4,
        ports in 0usize..4,
        port in 30000u16..32767,
    ) {
        let mut template = String::new();
        for _ in 0..images { template.push_str("image=*IMAGE_NAME*;"); }
        for _ in 0..subdomains { template.push_str("host=*SUBDOMAIN*;"); }
        for _ in 0..ports { template.push_str("port=*NODE_PORT*;"); }

        let rendered = manifest::render(&template, "repo/app:abcdef0", "1234567", port);
        prop_assert_eq!(rendered.matches("image=repo/app:abcdef0;").count(), images);
        prop_assert_eq!(rendered.matches("host=1234567;").count(), subdomains);
        let port_field = format!("port={};", port);
        prop_assert_eq!(rendered.matches(port_field.as_str()).count(), ports);
    }

    /// Materializing twice yields the same file at the same path, and the
    /// template itself is never modified.
    #[test]
    fn test_materialize_is_idempotent(
        template in template_strategy(),
        run_id in "[0-9]{1,10}",
        port in 30000u16..32767,
    ) {
        let dir = TempDir::new().unwrap();
        let template_path = dir.path().join("kubernetes-resources.yml");
        std::fs::write(&template_path, &template).unwrap();

        let first = manifest::materialize(&template_path, dir.path(), &run_id, "img:1", port).unwrap();
        let first_content = std::fs::read_to_string(&first).unwrap();
        let second = manifest::materialize(&template_path, dir.path(), &run_id, "img:1", port).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first_content, std::fs::read_to_string(&second).unwrap());
        prop_assert_eq!(std::fs::read_to_string(&template_path).unwrap(), template);
    }
}
