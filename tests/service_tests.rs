//! GeoQueryService tests

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use ghost_world::{
        error::WorldError,
        generator::{GeneratedEntity, PartialLocation},
        geo::haversine_m,
        service::GeoQueryService,
        types::{Entity, GeoPoint, ServiceConfig},
    };
    use serde_json::json;

    const SF: GeoPoint = GeoPoint {
        lat: 37.7749,
        lng: -122.4194,
    };

    fn ghost_at(svc: &GeoQueryService, at: GeoPoint) -> Entity {
        svc.create_entity(GeneratedEntity::default().with_request_defaults(at.lat, at.lng))
            .unwrap()
    }

    fn north_of(origin: GeoPoint, metres: f64) -> GeoPoint {
        // One degree of latitude is ~111.195 km on the mean sphere.
        GeoPoint::new(origin.lat + metres / 111_194.93, origin.lng)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    // -----------------------------------------------------------------------
    // Radius filter
    // -----------------------------------------------------------------------

    #[test]
    fn filters_by_radius() {
        let svc = GeoQueryService::default();
        let near = ghost_at(&svc, north_of(SF, 200.0));
        ghost_at(&svc, north_of(SF, 5_000.0));

        let hits = svc.query_near(SF, 1_000.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id, near.id);
        let d = hits[0].distance_m.unwrap();
        assert!((d - 200.0).abs() < 1.0, "distance was {d}");
    }

    #[test]
    fn candidate_exactly_at_radius_is_excluded() {
        let svc = GeoQueryService::default();
        let e = ghost_at(&svc, north_of(SF, 500.0));
        let exact = haversine_m(SF, e.location);

        assert!(svc.query_near(SF, exact).is_empty());
        assert_eq!(svc.query_near(SF, exact + 1e-6).len(), 1);
    }

    #[test]
    fn results_are_ordered_by_distance_then_id() {
        let svc = GeoQueryService::default();
        let far = ghost_at(&svc, north_of(SF, 800.0));
        let tie_a = ghost_at(&svc, north_of(SF, 300.0));
        let tie_b = ghost_at(&svc, north_of(SF, 300.0));
        let close = ghost_at(&svc, north_of(SF, 10.0));

        let ids: Vec<_> = svc
            .query_near(SF, 1_000.0)
            .into_iter()
            .map(|h| h.entity.id)
            .collect();
        assert_eq!(ids, vec![close.id, tie_a.id, tie_b.id, far.id]);
    }

    #[test]
    fn distances_are_non_decreasing() {
        let svc = GeoQueryService::default();
        for m in [900.0, 20.0, 450.0, 450.0, 10.0, 700.0, 0.0] {
            ghost_at(&svc, north_of(SF, m));
        }
        let hits = svc.query_near(SF, 1_000.0);
        assert_eq!(hits.len(), 7);
        for pair in hits.windows(2) {
            assert!(pair[0].distance_m <= pair[1].distance_m);
        }
    }

    #[test]
    fn results_are_capped() {
        let svc = GeoQueryService::default();
        for _ in 0..150 {
            ghost_at(&svc, SF);
        }
        let hits = svc.query_near(SF, 1_000.0);
        assert_eq!(hits.len(), 100);
        // Equal distances: ascending id, so the first hundred ids win.
        assert_eq!(hits.first().unwrap().entity.id, 1);
        assert_eq!(hits.last().unwrap().entity.id, 100);
    }

    #[test]
    fn cap_follows_configuration() {
        let svc = GeoQueryService::new(3);
        for _ in 0..5 {
            ghost_at(&svc, SF);
        }
        assert_eq!(svc.query_near(SF, 10.0).len(), 3);
        assert_eq!(svc.recent().len(), 3);
    }

    #[test]
    fn configured_cap_never_exceeds_one_hundred() {
        let config = ServiceConfig {
            max_results: 500,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WorldError::Config(_))));
        let at_limit = ServiceConfig {
            max_results: 100,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let svc = GeoQueryService::new(500);
        for _ in 0..120 {
            ghost_at(&svc, SF);
        }
        assert_eq!(svc.query_near(SF, 10.0).len(), 100);
        assert_eq!(svc.recent().len(), 100);
    }

    // -----------------------------------------------------------------------
    // Fallback listing
    // -----------------------------------------------------------------------

    #[test]
    fn fallback_lists_newest_first_without_distance() {
        let svc = GeoQueryService::default();
        let far_away = GeoPoint::new(-33.8688, 151.2093);
        let gen = || GeneratedEntity::default().with_request_defaults(far_away.lat, far_away.lng);

        let old = svc.create_entity_at(gen(), ts(0)).unwrap();
        let newest = svc.create_entity_at(gen(), ts(100)).unwrap();
        let tie_low = svc.create_entity_at(gen(), ts(50)).unwrap();
        let tie_high = svc.create_entity_at(gen(), ts(50)).unwrap();

        let hits = svc.query(None, 1_000.0);
        let ids: Vec<_> = hits.iter().map(|h| h.entity.id).collect();
        assert_eq!(ids, vec![newest.id, tie_high.id, tie_low.id, old.id]);
        assert!(hits.iter().all(|h| h.distance_m.is_none()));
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn create_applies_defaults() {
        let svc = GeoQueryService::default();
        let e = svc
            .create_entity(GeneratedEntity {
                location: Some(PartialLocation {
                    lat: Some(SF.lat),
                    lng: Some(SF.lng),
                }),
                visibility_radius_m: Some(json!("not a number")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(e.id, 1);
        assert_eq!(e.name, "Ghost #1");
        assert_eq!(e.visibility_radius_m, 100.0);
        assert_eq!(e.interaction_count, 0);
        assert!(e.interaction.is_none());
        assert_eq!(svc.get(1).unwrap(), e);
    }

    #[test]
    fn create_keeps_generated_content() {
        let svc = GeoQueryService::default();
        let e = svc
            .create_entity(
                GeneratedEntity {
                    name: Some("Lighthouse Keeper".into()),
                    personality: Some("melancholy".into()),
                    visibility_radius_m: Some(json!(250)),
                    interaction: Some(json!({
                        "type": "riddle",
                        "riddle": "What has a face and two hands?",
                        "correct_answer": "clock",
                        "reward": { "type": "badge", "value": "Timekeeper" }
                    })),
                    ..Default::default()
                }
                .with_request_defaults(SF.lat, SF.lng),
            )
            .unwrap();
        assert_eq!(e.name, "Lighthouse Keeper");
        assert_eq!(e.visibility_radius_m, 250.0);
        let interaction = e.interaction.unwrap();
        assert!(interaction.is_riddle_type());
        assert_eq!(interaction.reward.unwrap().value, "Timekeeper");
    }

    #[test]
    fn create_without_location_is_rejected_and_stores_nothing() {
        let svc = GeoQueryService::default();
        let err = svc.create_entity(GeneratedEntity::default()).unwrap_err();
        assert!(matches!(err, WorldError::Validation(_)));
        assert!(svc.is_empty());
    }

    #[test]
    fn ids_are_monotonic() {
        let svc = GeoQueryService::default();
        let a = ghost_at(&svc, SF);
        let b = ghost_at(&svc, SF);
        assert!(b.id > a.id);
    }

    // -----------------------------------------------------------------------
    // Interactions and stats
    // -----------------------------------------------------------------------

    #[test]
    fn report_interaction_increments_counter() {
        let svc = GeoQueryService::default();
        let e = ghost_at(&svc, SF);
        assert_eq!(svc.report_interaction(e.id).unwrap(), 1);
        assert_eq!(svc.report_interaction(e.id).unwrap(), 2);
        assert_eq!(svc.get(e.id).unwrap().interaction_count, 2);
    }

    #[test]
    fn report_interaction_unknown_id_is_not_found() {
        let svc = GeoQueryService::default();
        assert!(matches!(
            svc.report_interaction(999),
            Err(WorldError::NotFound(999))
        ));
        assert!(matches!(svc.get(999), Err(WorldError::NotFound(999))));
    }

    #[test]
    fn stats_reflect_activity() {
        let svc = GeoQueryService::default();
        let e = ghost_at(&svc, SF);
        svc.report_interaction(e.id).unwrap();
        svc.query_near(SF, 100.0);
        svc.recent();

        let stats = svc.stats();
        assert_eq!(stats.total_entities, 1);
        assert_eq!(stats.total_interactions, 1);
        assert_eq!(stats.total_queries, 2);
    }
}
