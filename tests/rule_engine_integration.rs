//! Integration tests for the rule engine.
//!
//! These tests drive the public API end to end:
//! - Cache hits, invalidation on rule-set changes and cache toggling
//! - Planning constraints over realistic operating-room contexts
//! - Fault isolation for failing, panicking and slow validators
//! - Cancellation and configuration loading

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use bloc_rules::config::{EngineConfig, load_rules};
use bloc_rules::engine::{
    CacheKey, EngineOptions, EvaluationCache, RuleCache, RuleEngine, RuleEngineError,
    RuleIssueKind, ValidatorError,
};
use bloc_rules::models::{
    Assignment, CarryOverRequest, EvaluationContext, EvaluationResult, MaxRoomsParams, Period,
    Rule, RuleOutcome, RuleParameters, RuleScope, RuleSeverity, RuleType, Sector, Subject,
};
use bloc_rules::validators::RuleValidator;

// ============================================================================
// Fixtures
// ============================================================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn morning(supervisor: &str, room: u32, sector: &str) -> Assignment {
    Assignment::new(supervisor, format!("room-{room}"), room, sector, monday(), Period::Morning)
}

fn sectors() -> Vec<Sector> {
    vec![
        Sector::new("general", "GENERAL"),
        Sector::new("endoscopy", "ENDOSCOPY"),
        Sector::new("ophtalmo", "OPHTALMOLOGY").contiguous(),
    ]
}

fn planning(proposed: Assignment, existing: Vec<Assignment>) -> EvaluationContext {
    EvaluationContext::new(Subject::new(proposed.supervisor_id.clone()), monday())
        .with_proposed(proposed)
        .with_existing(existing)
        .with_sectors(sectors())
}

fn max_rooms_rule(warn_at: Option<usize>) -> Rule {
    Rule::new(
        "max-rooms",
        "Maximum rooms per supervisor",
        RuleType::MaxRoomsPerSupervisor,
        RuleSeverity::Error,
        RuleParameters::MaxRoomsPerSupervisor(MaxRoomsParams {
            max_rooms: 2,
            warn_at,
        }),
    )
}

fn custom_rule(id: &str, custom_type: &str, priority: i32) -> Rule {
    Rule::new(
        id,
        id,
        RuleType::Custom(custom_type.to_string()),
        RuleSeverity::Error,
        RuleParameters::default(),
    )
    .with_priority(priority)
}

fn engine_with(rules: Vec<Rule>) -> RuleEngine {
    RuleEngine::new(EngineOptions::default().with_rules(rules)).unwrap()
}

fn same_outcome(a: &EvaluationResult, b: &EvaluationResult) -> bool {
    a.is_valid == b.is_valid
        && a.violations == b.violations
        && a.warnings == b.warnings
        && a.score == b.score
}

/// Cache wrapper counting every call the engine makes
#[derive(Default)]
struct CountingCache {
    inner: RuleCache,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingCache {
    fn calls(&self) -> (usize, usize) {
        (self.reads.load(Ordering::SeqCst), self.writes.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl EvaluationCache for CountingCache {
    async fn get_cached_evaluation(&self, key: &CacheKey) -> Option<EvaluationResult> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_cached_evaluation(key).await
    }

    async fn cache_evaluation(&self, result: EvaluationResult, key: &CacheKey) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.cache_evaluation(result, key).await
    }

    async fn clear_cache(&self) {
        self.inner.clear_cache().await
    }

    async fn invalidate_for_doctor(&self, subject_id: &str) -> usize {
        self.inner.invalidate_for_doctor(subject_id).await
    }
}

struct FailingValidator;

#[async_trait]
impl RuleValidator for FailingValidator {
    async fn validate(
        &self,
        _rule: &Rule,
        _ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        Err(ValidatorError::Execution("assignment store unavailable".to_string()))
    }
}

struct PanickingValidator;

#[async_trait]
impl RuleValidator for PanickingValidator {
    async fn validate(
        &self,
        _rule: &Rule,
        _ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        panic!("validator exploded")
    }
}

struct SlowValidator;

#[async_trait]
impl RuleValidator for SlowValidator {
    async fn validate(
        &self,
        rule: &Rule,
        _ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(RuleOutcome::pass(rule, "eventually"))
    }
}

/// Cancels the request it belongs to, then never completes
struct CancellingValidator {
    token: CancellationToken,
}

#[async_trait]
impl RuleValidator for CancellingValidator {
    async fn validate(
        &self,
        _rule: &Rule,
        _ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        self.token.cancel();
        std::future::pending().await
    }
}

struct AlwaysFails;

#[async_trait]
impl RuleValidator for AlwaysFails {
    async fn validate(
        &self,
        rule: &Rule,
        _ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        Ok(RuleOutcome::fail(rule, "always fails"))
    }
}

// ============================================================================
// Caching Tests
// ============================================================================

#[tokio::test]
async fn test_repeated_evaluation_is_served_from_cache() {
    let engine = engine_with(bloc_rules::default_rules());
    let ctx = planning(
        morning("dr-s", 3, "general"),
        vec![morning("dr-s", 1, "general"), morning("dr-s", 2, "general")],
    );

    let first = engine.evaluate(&ctx).await.unwrap();
    let second = engine.evaluate(&ctx).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert!(same_outcome(&first, &second));
}

#[tokio::test]
async fn test_rule_mutations_make_cached_results_unreachable() {
    let engine = engine_with(vec![max_rooms_rule(Some(3))]);
    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());

    engine.evaluate(&ctx).await.unwrap();
    assert!(engine.evaluate(&ctx).await.unwrap().from_cache);

    engine.add_rule(custom_rule("extra", "NOOP", 0)).await.unwrap();
    assert!(!engine.evaluate(&ctx).await.unwrap().from_cache);
    assert!(engine.evaluate(&ctx).await.unwrap().from_cache);

    engine.remove_rule("extra").await.unwrap();
    assert!(!engine.evaluate(&ctx).await.unwrap().from_cache);
    assert!(engine.evaluate(&ctx).await.unwrap().from_cache);

    engine.set_rule_status("max-rooms", false).await.unwrap();
    assert!(!engine.evaluate(&ctx).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_disabled_cache_is_never_consulted() {
    let cache = Arc::new(CountingCache::default());
    let engine = RuleEngine::with_cache(
        EngineOptions::default().with_rules(vec![max_rooms_rule(Some(3))]),
        cache.clone(),
    )
    .unwrap();
    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());

    engine.evaluate(&ctx).await.unwrap();
    assert_eq!(cache.calls(), (1, 1));

    engine.set_enable_cache(false).await;
    assert!(cache.inner.is_empty().await, "disabling drops cached results");

    let result = engine.evaluate(&ctx).await.unwrap();
    engine.evaluate(&ctx).await.unwrap();
    assert!(!result.from_cache);
    assert_eq!(cache.calls(), (1, 1));

    engine.set_enable_cache(true).await;
    assert!(!engine.evaluate(&ctx).await.unwrap().from_cache);
    assert!(engine.evaluate(&ctx).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_cache_controls_are_noops_when_disabled() {
    let cache = Arc::new(CountingCache::default());
    let engine = RuleEngine::with_cache(
        EngineOptions::default()
            .with_rules(vec![max_rooms_rule(Some(3))])
            .with_cache_enabled(false),
        cache.clone(),
    )
    .unwrap();

    engine.clear_cache().await;
    assert_eq!(engine.invalidate_cache_for_doctor("dr-s").await, 0);
    engine
        .evaluate(&planning(morning("dr-s", 1, "general"), Vec::new()))
        .await
        .unwrap();
    assert_eq!(cache.calls(), (0, 0));
}

#[tokio::test]
async fn test_invalidation_for_doctor_keeps_unrelated_entries() {
    let engine = engine_with(vec![max_rooms_rule(Some(3))]);
    let for_a = planning(morning("dr-a", 1, "general"), Vec::new());
    let for_b = planning(morning("dr-b", 2, "general"), Vec::new());

    engine.evaluate(&for_a).await.unwrap();
    engine.evaluate(&for_b).await.unwrap();

    assert_eq!(engine.invalidate_cache_for_doctor("dr-a").await, 1);
    assert!(!engine.evaluate(&for_a).await.unwrap().from_cache);
    assert!(engine.evaluate(&for_b).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_concurrent_evaluations_share_the_cache() {
    let engine = Arc::new(engine_with(bloc_rules::default_rules()));
    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());
    engine.evaluate(&ctx).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move { engine.evaluate(&ctx).await }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.from_cache);
        assert!(result.is_valid);
    }
}

// ============================================================================
// Planning Constraint Tests
// ============================================================================

#[tokio::test]
async fn test_warning_rule_still_blocks_beyond_hard_cap() {
    let mut rule = max_rooms_rule(Some(3));
    rule.severity = RuleSeverity::Warning;
    let engine = engine_with(vec![rule]);
    let ctx = planning(
        morning("dr-s", 4, "general"),
        vec![
            morning("dr-s", 1, "general"),
            morning("dr-s", 2, "general"),
            morning("dr-s", 3, "general"),
        ],
    );

    let result = engine.evaluate(&ctx).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.violations.len(), 1);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_afternoon_before_same_day_night_lacks_rest() {
    let engine = engine_with(bloc_rules::default_rules());
    let mut afternoon = morning("dr-s", 2, "general");
    afternoon.period = Period::Afternoon;
    let mut night = morning("dr-s", 1, "general");
    night.period = Period::Night;

    let result = engine.evaluate(&planning(afternoon, vec![night])).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_id, "min-rest-period");
}

#[tokio::test]
async fn test_two_rooms_are_clean_and_third_room_warns() {
    let engine = engine_with(vec![max_rooms_rule(Some(3))]);

    let two = planning(morning("dr-s", 2, "general"), vec![morning("dr-s", 1, "general")]);
    let result = engine.evaluate(&two).await.unwrap();
    assert!(result.is_valid);
    assert!(result.violations.is_empty());
    assert!(result.warnings.is_empty());

    let three = planning(
        morning("dr-s", 3, "general"),
        vec![morning("dr-s", 1, "general"), morning("dr-s", 2, "general")],
    );
    let result = engine.evaluate(&three).await.unwrap();
    assert!(result.is_valid);
    assert!(result.violations.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].severity, RuleSeverity::Warning);
    assert!(result.warnings[0].message.contains("not recommended"));
    assert_eq!(result.score, 0.5);
}

#[tokio::test]
async fn test_non_contiguous_rooms_are_a_violation() {
    let engine = engine_with(bloc_rules::default_rules());
    let ctx = planning(
        morning("dr-s", 3, "ophtalmo"),
        vec![morning("dr-s", 1, "ophtalmo")],
    );

    let result = engine.evaluate(&ctx).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_id, "room-contiguity");
    assert_eq!(result.violations[0].severity, RuleSeverity::Error);
}

#[tokio::test]
async fn test_general_with_endoscopy_is_a_violation() {
    let engine = engine_with(bloc_rules::default_rules());
    let ctx = planning(
        morning("dr-s", 2, "endoscopy"),
        vec![morning("dr-s", 1, "general")],
    );

    let result = engine.evaluate(&ctx).await.unwrap();
    assert!(!result.is_valid);
    let violation = result
        .violations
        .iter()
        .find(|v| v.rule_id == "sector-compatibility")
        .expect("sector violation");
    assert!(violation.message.contains("general"));
    assert!(violation.message.contains("endoscopy"));
}

#[tokio::test]
async fn test_disabled_rule_never_contributes() {
    let engine = engine_with(vec![max_rooms_rule(None)]);
    let ctx = planning(
        morning("dr-s", 3, "general"),
        vec![morning("dr-s", 1, "general"), morning("dr-s", 2, "general")],
    );
    assert!(!engine.evaluate(&ctx).await.unwrap().is_valid);

    engine.set_rule_status("max-rooms", false).await.unwrap();
    let result = engine.evaluate(&ctx).await.unwrap();
    assert!(result.is_valid);
    assert!(result.warnings.is_empty());
    assert_eq!(result.evaluated_rules, 0);
}

#[tokio::test]
async fn test_scoped_rules_apply_only_to_their_target() {
    let engine = engine_with(vec![
        max_rooms_rule(None).with_scope(RuleScope::PerUser("dr-a".to_string())),
    ]);
    let crowded = |supervisor: &str| {
        planning(
            morning(supervisor, 3, "general"),
            vec![morning(supervisor, 1, "general"), morning(supervisor, 2, "general")],
        )
    };

    assert!(!engine.evaluate(&crowded("dr-a")).await.unwrap().is_valid);
    assert!(engine.evaluate(&crowded("dr-b")).await.unwrap().is_valid);
}

#[tokio::test]
async fn test_sector_scoped_rule_follows_the_proposed_sector() {
    let engine = engine_with(vec![
        max_rooms_rule(None).with_scope(RuleScope::PerSector("ophtalmo".to_string())),
    ]);
    let crowded = |sector: &str| {
        planning(
            morning("dr-s", 3, sector),
            vec![morning("dr-s", 1, sector), morning("dr-s", 2, sector)],
        )
    };

    let in_sector = engine.evaluate(&crowded("ophtalmo")).await.unwrap();
    assert!(!in_sector.is_valid);
    assert_eq!(in_sector.evaluated_rules, 1);

    let elsewhere = engine.evaluate(&crowded("general")).await.unwrap();
    assert!(elsewhere.is_valid);
    assert_eq!(elsewhere.evaluated_rules, 0);

    let no_proposal = EvaluationContext::new(Subject::new("dr-s"), monday());
    let result = engine.evaluate(&no_proposal).await.unwrap();
    assert!(result.is_valid);
    assert_eq!(result.evaluated_rules, 0);
}

#[tokio::test]
async fn test_carry_over_above_balance_is_a_violation() {
    let engine = engine_with(bloc_rules::default_rules());
    let request = |requested_days: f64| CarryOverRequest {
        leave_type: "ANNUAL".to_string(),
        from_year: 2024,
        to_year: 2025,
        requested_days,
        source_remaining: 6.0,
    };
    let leave = |requested_days: f64| {
        EvaluationContext::new(Subject::new("dr-s"), monday()).with_carry_over(request(requested_days))
    };

    let result = engine.evaluate(&leave(8.0)).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_id, "annual-leave-carry-over");
    assert!(result.violations[0].message.contains("only 6 remain"));

    let result = engine.evaluate(&leave(4.0)).await.unwrap();
    assert!(result.is_valid);
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_outcomes_are_reported_in_priority_order() {
    let engine = engine_with(vec![
        custom_rule("low", "FAILS", 1),
        custom_rule("high", "FAILS", 50),
        custom_rule("mid", "FAILS", 10),
    ]);
    engine
        .register_validator(RuleType::Custom("FAILS".to_string()), Arc::new(AlwaysFails))
        .await;

    let result = engine
        .evaluate(&planning(morning("dr-s", 1, "general"), Vec::new()))
        .await
        .unwrap();
    let order: Vec<&str> = result.violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert_eq!(order, vec!["high", "mid", "low"]);
    assert_eq!(result.score, 3.0);
}

// ============================================================================
// Validator Fault Tests
// ============================================================================

#[tokio::test]
async fn test_failing_and_panicking_validators_do_not_abort_evaluation() {
    let engine = engine_with(vec![
        custom_rule("store-check", "STORE", 30),
        custom_rule("exploding", "BOOM", 20),
        max_rooms_rule(Some(3)).with_priority(10),
    ]);
    engine
        .register_validator(RuleType::Custom("STORE".to_string()), Arc::new(FailingValidator))
        .await;
    engine
        .register_validator(RuleType::Custom("BOOM".to_string()), Arc::new(PanickingValidator))
        .await;

    let ctx = planning(
        morning("dr-s", 3, "general"),
        vec![morning("dr-s", 1, "general"), morning("dr-s", 2, "general")],
    );
    let result = engine.evaluate(&ctx).await.unwrap();

    assert!(!result.is_valid);
    assert_eq!(result.evaluated_rules, 3);
    assert_eq!(result.violations.len(), 2);
    assert_eq!(result.violations[0].rule_id, "store-check");
    assert!(result.violations[0].message.contains("assignment store unavailable"));
    assert_eq!(result.violations[1].rule_id, "exploding");
    assert!(result.violations[1].message.contains("validator exploded"));
    assert_eq!(result.warnings.len(), 1, "remaining rules still report");
}

#[tokio::test(start_paused = true)]
async fn test_slow_validator_times_out() {
    let options = EngineOptions {
        validator_timeout: Some(Duration::from_millis(100)),
        ..EngineOptions::default()
    }
    .with_rules(vec![custom_rule("slow", "SLOW", 0)]);
    let engine = RuleEngine::new(options).unwrap();
    engine
        .register_validator(RuleType::Custom("SLOW".to_string()), Arc::new(SlowValidator))
        .await;

    let result = engine
        .evaluate(&planning(morning("dr-s", 1, "general"), Vec::new()))
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert!(result.violations[0].message.contains("timed out"));
}

#[tokio::test]
async fn test_unregistered_rule_type_is_skipped() {
    let engine = engine_with(vec![custom_rule("inert", "UNKNOWN", 0), max_rooms_rule(Some(3))]);

    let result = engine
        .evaluate(&planning(morning("dr-s", 1, "general"), Vec::new()))
        .await
        .unwrap();
    assert!(result.is_valid);
    assert_eq!(result.evaluated_rules, 1);

    let issues = engine.check_rule_set().await;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].rule_id, "inert");
    assert_eq!(issues[0].kind, RuleIssueKind::UnregisteredValidator);
}

#[tokio::test]
async fn test_registering_a_validator_activates_inert_rules() {
    let engine = engine_with(vec![custom_rule("late", "LATE", 0)]);
    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());
    assert!(engine.evaluate(&ctx).await.unwrap().is_valid);

    engine
        .register_validator(RuleType::Custom("LATE".to_string()), Arc::new(AlwaysFails))
        .await;
    let result = engine.evaluate(&ctx).await.unwrap();
    assert!(!result.from_cache);
    assert!(!result.is_valid);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_evaluation_writes_nothing() {
    let token = CancellationToken::new();
    let cache = Arc::new(RuleCache::default());
    let engine = RuleEngine::with_cache(
        EngineOptions::default().with_rules(vec![custom_rule("hangs", "HANG", 0)]),
        cache.clone(),
    )
    .unwrap();
    engine
        .register_validator(
            RuleType::Custom("HANG".to_string()),
            Arc::new(CancellingValidator {
                token: token.clone(),
            }),
        )
        .await;

    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());
    let result = engine.evaluate_with_cancellation(&ctx, &token).await;

    assert_eq!(result.unwrap_err(), RuleEngineError::Cancelled);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_already_cancelled_request_is_rejected() {
    let engine = engine_with(bloc_rules::default_rules());
    let token = CancellationToken::new();
    token.cancel();

    let ctx = planning(morning("dr-s", 1, "general"), Vec::new());
    assert_eq!(
        engine.evaluate_with_cancellation(&ctx, &token).await.unwrap_err(),
        RuleEngineError::Cancelled
    );
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_engine_from_yaml_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("engine.yaml");
    std::fs::write(
        &config_path,
        "cache:\n  enabled: false\nscoring:\n  error_weight: 4.0\n  warning_weight: 1.0\n  info_weight: 0.0\n",
    )
    .unwrap();
    let rules_path = dir.path().join("rules.yaml");
    let rule_set = bloc_rules::config::RuleSetFile {
        rules: vec![max_rooms_rule(Some(3))],
    };
    std::fs::write(&rules_path, serde_yaml::to_string(&rule_set).unwrap()).unwrap();

    let config = EngineConfig::from_file(&config_path).unwrap();
    let rules = load_rules(&rules_path).unwrap();
    let engine = RuleEngine::from_config(&config, rules).unwrap();

    assert!(!engine.is_cache_enabled());
    let ctx = planning(
        morning("dr-s", 3, "general"),
        vec![morning("dr-s", 1, "general"), morning("dr-s", 2, "general")],
    );
    let result = engine.evaluate(&ctx).await.unwrap();
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.score, 1.0);
}

#[tokio::test]
async fn test_duplicate_rule_is_rejected() {
    let engine = engine_with(vec![max_rooms_rule(Some(3))]);
    assert_eq!(
        engine.add_rule(max_rooms_rule(None)).await.unwrap_err(),
        RuleEngineError::DuplicateRule("max-rooms".to_string())
    );
    assert_eq!(engine.rules().await.len(), 1);
}
