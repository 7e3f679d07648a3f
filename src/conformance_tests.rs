#[cfg(test)]
mod tests {
    use crate::feature_map::{build_feature_map, cluster_feature_conformance, enabled_bits, flip_bits, ClusterFeature};
    use crate::*;

    fn map(entries: &[(&str, bool)]) -> ElementMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn classify(expression: &str, entries: &[(&str, bool)]) -> ConformanceResult {
        evaluate_conformance_expression(expression, &map(entries)).unwrap()
    }

    #[test]
    fn test_terms_in_order() {
        assert_eq!(get_terms_from_expression("A & (!B | C)"), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_mandatory_abbreviation() {
        assert_eq!(classify("M", &[]), ConformanceResult::Mandatory);
    }

    #[test]
    fn test_optional_group() {
        assert_eq!(classify("[A]", &[("A", true)]), ConformanceResult::Optional);
        assert_eq!(classify("[A]", &[("A", false)]), ConformanceResult::NotSupported);
    }

    #[test]
    fn test_otherwise_first_part_holds() {
        assert_eq!(
            classify("A & B, [!C]", &[("A", true), ("B", true), ("C", false)]),
            ConformanceResult::Mandatory
        );
    }

    #[test]
    fn test_otherwise_falls_through_to_optional() {
        assert_eq!(
            classify("A & B, [!C]", &[("A", false), ("B", true), ("C", false)]),
            ConformanceResult::Optional
        );
    }

    #[test]
    fn test_desc_regardless_of_terms() {
        assert_eq!(classify("desc & A", &[("A", true)]), ConformanceResult::Desc);
        assert_eq!(classify("desc & A", &[("A", false)]), ConformanceResult::Desc);
    }

    #[test]
    fn test_missing_terms_against_map() {
        assert_eq!(check_missing_terms("A & B", &map(&[("A", true)])), vec!["B"]);
    }

    #[test]
    fn test_resolving_twice_changes_nothing() {
        let table: FeatureConformanceTable = vec![
            ("LT", "O"),
            ("DF", "LT"),
            ("OFFONLY", "[!LT]"),
            ("TRANS", "DF & !OFFONLY"),
        ]
        .into_iter()
        .collect();
        let mut element_map = map(&[("LT", true), ("DF", false), ("OFFONLY", true), ("TRANS", false)]);

        let first = fix_feature_conformance_recursively(
            &table,
            &mut element_map,
            FeatureUpdate::seeded(["LT"]),
        )
        .unwrap();
        assert_eq!(first.updated_features.get("DF"), Some(&true));
        assert_eq!(first.updated_features.get("OFFONLY"), Some(&false));
        assert_eq!(first.updated_features.get("TRANS"), Some(&true));

        let second = fix_feature_conformance_recursively(
            &table,
            &mut element_map,
            FeatureUpdate::seeded(first.updated_keys.clone()),
        )
        .unwrap();
        assert!(second.updated_features.is_empty());
        assert_eq!(second.updated_keys, first.updated_keys);
    }

    #[test]
    fn test_feature_map_bits_drive_resolution() {
        let features = vec![
            ClusterFeature {
                feature_id: 1,
                code: "LT".into(),
                name: "Lighting".into(),
                bit: 0,
                conformance: Some("O".into()),
                cluster_ref: Some(6),
            },
            ClusterFeature {
                feature_id: 2,
                code: "DF".into(),
                name: "DeadFrontBehavior".into(),
                bit: 1,
                conformance: Some("LT".into()),
                cluster_ref: Some(6),
            },
        ];
        let table = cluster_feature_conformance(&features, &[]);

        // User turns on LT (bit 0) from an empty FeatureMap.
        let feature_map_value = flip_bits(0, &[0]);
        let inclusion: Vec<u32> = enabled_bits(feature_map_value)
            .into_iter()
            .filter_map(|bit| features.iter().find(|f| f.bit == bit).map(|f| f.feature_id))
            .collect();
        let mut element_map = build_feature_map(&features, &inclusion);

        let update = FeatureResolver::default()
            .resolve(&table, &mut element_map, FeatureUpdate::seeded(["LT"]))
            .unwrap();
        assert_eq!(update.updated_keys, vec!["LT", "DF"]);

        let bits: Vec<u32> = update
            .updated_features
            .keys()
            .filter_map(|code| features.iter().find(|f| &f.code == code).map(|f| f.bit))
            .collect();
        assert_eq!(flip_bits(feature_map_value, &bits), 0b11);
    }

    #[test]
    fn test_legacy_split_keeps_old_behavior() {
        let legacy = ConformanceEvaluator::new(EvaluatorOptions {
            split_mode: SplitMode::Legacy,
            ..Default::default()
        });
        let nested = ConformanceEvaluator::default();
        let m = map(&[("A", false), ("B", true)]);

        assert_eq!(nested.evaluate("A, [A | B]", &m).unwrap(), ConformanceResult::Optional);
        assert_eq!(legacy.evaluate("A, [A | B]", &m).unwrap(), ConformanceResult::Optional);

        // Legacy cuts the group in half; nested reads its comma as an alternative.
        assert_eq!(legacy.evaluate("[A, B]", &m).unwrap_err().code, ERR_UNBALANCED_BRACKETS);
        assert_eq!(nested.evaluate("[A, B]", &m).unwrap(), ConformanceResult::Optional);
    }

    #[test]
    fn test_error_points_into_full_expression() {
        let err = evaluate_conformance_expression("[A & ], M", &map(&[])).unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(err.expression, "[A & ], M");
    }

    #[test]
    fn test_unknown_term_is_false_but_reported_missing() {
        let m = map(&[("A", true)]);
        assert_eq!(evaluate_conformance_expression("Z", &m).unwrap(), ConformanceResult::NotSupported);
        assert_eq!(check_missing_terms("Z", &m), vec!["Z"]);
    }
}
