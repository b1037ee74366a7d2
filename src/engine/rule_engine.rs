//! Rule engine: owns the active rule set and orchestrates evaluation.
//!
//! ## Evaluation
//!
//! 1. With caching on, the context fingerprint is looked up first. A hit is
//!    returned with `from_cache = true` and no validator runs.
//! 2. Otherwise the applicable rules (active, scope matching) are evaluated
//!    one after another in descending priority, each by the validator
//!    registered for its type. Rules without a validator are skipped.
//! 3. Failed outcomes are sorted into violations, warnings and notices by
//!    severity and weighted into the score.
//! 4. With caching on, the result is stored before being returned.
//!
//! A validator that errors, panics or exceeds its time limit yields a
//! failed ERROR outcome for its rule; the remaining rules still run.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cache::{EvaluationCache, RuleCache};
use super::consistency::{RuleIssue, check_rules};
use super::errors::RuleEngineError;
use super::fingerprint::CacheKey;
use crate::config::{EngineConfig, ScoringConfig};
use crate::models::{
    EvaluationContext, EvaluationResult, Rule, RuleOutcome, RuleScope, RuleSeverity, RuleType,
};
use crate::validators::{RuleValidator, builtin_validators};

// ============================================================================
// Options
// ============================================================================

/// Construction options of a [`RuleEngine`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Memoize evaluation results
    pub enable_cache: bool,
    /// Initial active rule set
    pub default_rules: Vec<Rule>,
    /// Register the built-in validator of every built-in rule type
    pub builtin_validators: bool,
    /// Penalty weights per severity
    pub scoring: ScoringConfig,
    /// Time one validator may take; `None` waits indefinitely
    pub validator_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_cache: true,
            default_rules: Vec::new(),
            builtin_validators: true,
            scoring: ScoringConfig::default(),
            validator_timeout: None,
        }
    }
}

impl EngineOptions {
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.default_rules = rules;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }
}

// ============================================================================
// Engine
// ============================================================================

struct RuleSet {
    rules: Vec<Rule>,
    /// Bumped on every change that can alter an evaluation
    version: u64,
}

impl RuleSet {
    fn position(&self, rule_id: &str) -> Result<usize, RuleEngineError> {
        self.rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| RuleEngineError::RuleNotFound(rule_id.to_string()))
    }
}

/// Evaluates an [`EvaluationContext`] against the active rule set
pub struct RuleEngine {
    rule_set: RwLock<RuleSet>,
    validators: RwLock<HashMap<RuleType, Arc<dyn RuleValidator>>>,
    cache: Arc<dyn EvaluationCache>,
    cache_enabled: AtomicBool,
    scoring: ScoringConfig,
    validator_timeout: Option<Duration>,
}

impl RuleEngine {
    /// Create an engine backed by a default in-memory [`RuleCache`]
    pub fn new(options: EngineOptions) -> Result<Self, RuleEngineError> {
        Self::with_cache(options, Arc::new(RuleCache::default()))
    }

    /// Create an engine using `cache` for memoization
    pub fn with_cache(
        options: EngineOptions,
        cache: Arc<dyn EvaluationCache>,
    ) -> Result<Self, RuleEngineError> {
        let mut rules: Vec<Rule> = Vec::with_capacity(options.default_rules.len());
        for rule in options.default_rules {
            if rules.iter().any(|r| r.id == rule.id) {
                return Err(RuleEngineError::DuplicateRule(rule.id));
            }
            rules.push(rule);
        }

        let validators: HashMap<RuleType, Arc<dyn RuleValidator>> = if options.builtin_validators {
            builtin_validators().into_iter().collect()
        } else {
            HashMap::new()
        };

        info!(
            rules = rules.len(),
            validators = validators.len(),
            cache = options.enable_cache,
            "Rule engine initialized"
        );

        Ok(Self {
            rule_set: RwLock::new(RuleSet { rules, version: 1 }),
            validators: RwLock::new(validators),
            cache,
            cache_enabled: AtomicBool::new(options.enable_cache),
            scoring: options.scoring,
            validator_timeout: options.validator_timeout,
        })
    }

    /// Create an engine from configuration and an initial rule set
    pub fn from_config(config: &EngineConfig, rules: Vec<Rule>) -> Result<Self, RuleEngineError> {
        let options = EngineOptions {
            enable_cache: config.cache.enabled,
            default_rules: rules,
            builtin_validators: true,
            scoring: config.scoring,
            validator_timeout: Some(config.evaluation.validator_timeout()),
        };
        Self::with_cache(options, Arc::new(RuleCache::from_config(&config.cache)))
    }

    // ========================================================================
    // Rule Set Mutation
    // ========================================================================

    /// Insert a rule into the active set
    pub async fn add_rule(&self, rule: Rule) -> Result<(), RuleEngineError> {
        {
            let mut set = self.rule_set.write().await;
            if set.rules.iter().any(|r| r.id == rule.id) {
                return Err(RuleEngineError::DuplicateRule(rule.id));
            }
            info!(rule_id = %rule.id, rule_type = %rule.rule_type, "Rule added");
            set.rules.push(rule);
            set.version += 1;
        }
        self.invalidate_all().await;
        Ok(())
    }

    /// Remove a rule from the active set, returning it
    pub async fn remove_rule(&self, rule_id: &str) -> Result<Rule, RuleEngineError> {
        let removed = {
            let mut set = self.rule_set.write().await;
            let index = set.position(rule_id)?;
            set.version += 1;
            set.rules.remove(index)
        };
        info!(rule_id, "Rule removed");
        self.invalidate_all().await;
        Ok(removed)
    }

    /// Replace the rule with the same id
    pub async fn update_rule(&self, rule: Rule) -> Result<(), RuleEngineError> {
        {
            let mut set = self.rule_set.write().await;
            let index = set.position(&rule.id)?;
            info!(rule_id = %rule.id, version = rule.version, "Rule updated");
            set.rules[index] = rule;
            set.version += 1;
        }
        self.invalidate_all().await;
        Ok(())
    }

    /// Enable or disable a rule in place
    pub async fn set_rule_status(&self, rule_id: &str, enabled: bool) -> Result<(), RuleEngineError> {
        {
            let mut set = self.rule_set.write().await;
            let index = set.position(rule_id)?;
            if set.rules[index].enabled == enabled {
                return Ok(());
            }
            set.rules[index].enabled = enabled;
            set.version += 1;
        }
        info!(rule_id, enabled, "Rule status changed");
        self.invalidate_all().await;
        Ok(())
    }

    /// Associate `validator` with `rule_type`, replacing any previous one
    pub async fn register_validator(&self, rule_type: RuleType, validator: Arc<dyn RuleValidator>) {
        let replaced = self
            .validators
            .write()
            .await
            .insert(rule_type.clone(), validator)
            .is_some();
        // rules of this type may have been inert until now
        self.rule_set.write().await.version += 1;
        info!(%rule_type, replaced, "Validator registered");
        self.invalidate_all().await;
    }

    // ========================================================================
    // Cache Control
    // ========================================================================

    /// Turn memoization on or off. Turning it off drops every cached result.
    pub async fn set_enable_cache(&self, enabled: bool) {
        let was_enabled = self.cache_enabled.swap(enabled, Ordering::SeqCst);
        if was_enabled && !enabled {
            self.cache.clear_cache().await;
        }
        info!(enabled, "Evaluation cache toggled");
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::SeqCst)
    }

    /// Drop every cached result. No-op when caching is off.
    pub async fn clear_cache(&self) {
        if self.is_cache_enabled() {
            self.cache.clear_cache().await;
        }
    }

    /// Drop cached results whose context references `subject_id`.
    /// No-op when caching is off.
    pub async fn invalidate_cache_for_doctor(&self, subject_id: &str) -> usize {
        if !self.is_cache_enabled() {
            return 0;
        }
        self.cache.invalidate_for_doctor(subject_id).await
    }

    async fn invalidate_all(&self) {
        if self.is_cache_enabled() {
            self.cache.clear_cache().await;
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Active rule set, in evaluation order
    pub async fn rules(&self) -> Vec<Rule> {
        let set = self.rule_set.read().await;
        let mut rules = set.rules.clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    pub async fn rule(&self, rule_id: &str) -> Option<Rule> {
        let set = self.rule_set.read().await;
        set.rules.iter().find(|r| r.id == rule_id).cloned()
    }

    pub async fn rule_set_version(&self) -> u64 {
        self.rule_set.read().await.version
    }

    /// Static consistency report of the active rule set
    pub async fn check_rule_set(&self) -> Vec<RuleIssue> {
        let registered: HashSet<RuleType> = self.validators.read().await.keys().cloned().collect();
        let set = self.rule_set.read().await;
        check_rules(&set.rules, &registered)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate `ctx` against the active rule set
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluationResult, RuleEngineError> {
        self.evaluate_with_cancellation(ctx, &CancellationToken::new())
            .await
    }

    /// Evaluate `ctx`, abandoning the evaluation when `cancel` fires.
    ///
    /// A cancelled evaluation returns [`RuleEngineError::Cancelled`] and
    /// leaves the cache untouched.
    pub async fn evaluate_with_cancellation(
        &self,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, RuleEngineError> {
        if cancel.is_cancelled() {
            return Err(RuleEngineError::Cancelled);
        }

        let (rules, version) = {
            let set = self.rule_set.read().await;
            let mut rules: Vec<Rule> = set
                .rules
                .iter()
                .filter(|r| r.is_active() && scope_matches(&r.scope, ctx))
                .cloned()
                .collect();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            (rules, set.version)
        };

        let key = if self.is_cache_enabled() {
            match CacheKey::new(ctx, version) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(error = %e, "Context could not be fingerprinted; caching skipped");
                    None
                }
            }
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(mut cached) = self.cache.get_cached_evaluation(key).await {
                debug!(subject = %ctx.subject.id, "Evaluation served from cache");
                cached.from_cache = true;
                return Ok(cached);
            }
            debug!(subject = %ctx.subject.id, "Evaluation cache miss");
        }

        let validators = self.validators.read().await.clone();
        let mut outcomes = Vec::with_capacity(rules.len());
        let mut evaluated = 0;

        for rule in &rules {
            let Some(validator) = validators.get(&rule.rule_type) else {
                warn!(
                    rule_id = %rule.id,
                    rule_type = %rule.rule_type,
                    "No validator registered for rule type; rule skipped"
                );
                continue;
            };
            evaluated += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(rule_id = %rule.id, "Evaluation cancelled");
                    return Err(RuleEngineError::Cancelled);
                }
                outcome = self.run_validator(validator.as_ref(), rule, ctx) => outcome,
            };
            outcomes.push(outcome);
        }

        let result = aggregate(&self.scoring, outcomes, evaluated);
        debug!(
            subject = %ctx.subject.id,
            is_valid = result.is_valid,
            violations = result.violations.len(),
            warnings = result.warnings.len(),
            score = result.score,
            "Evaluation complete"
        );

        if let Some(key) = &key {
            if cancel.is_cancelled() {
                return Err(RuleEngineError::Cancelled);
            }
            if self.is_cache_enabled() {
                self.cache.cache_evaluation(result.clone(), key).await;
            }
        }

        Ok(result)
    }

    /// Run one validator, converting faults into a failed ERROR outcome
    async fn run_validator(
        &self,
        validator: &dyn RuleValidator,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> RuleOutcome {
        let call = AssertUnwindSafe(validator.validate(rule, ctx)).catch_unwind();
        let completed = match self.validator_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(completed) => completed,
                Err(_) => {
                    warn!(rule_id = %rule.id, timeout_ms = limit.as_millis() as u64, "Validator timed out");
                    return fault_outcome(
                        rule,
                        format!("Validator timed out after {}ms", limit.as_millis()),
                    );
                }
            },
            None => call.await,
        };

        match completed {
            Ok(Ok(mut outcome)) => {
                outcome.rule_id = rule.id.clone();
                outcome
            }
            Ok(Err(e)) => {
                warn!(rule_id = %rule.id, error = %e, "Validator failed");
                fault_outcome(rule, format!("Validator failed: {e}"))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(rule_id = %rule.id, reason = %reason, "Validator panicked");
                fault_outcome(rule, format!("Validator panicked: {reason}"))
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn scope_matches(scope: &RuleScope, ctx: &EvaluationContext) -> bool {
    match scope {
        RuleScope::Global => true,
        RuleScope::PerSector(sector_id) => ctx
            .proposed
            .as_ref()
            .map(|a| &a.sector_id == sector_id)
            .unwrap_or(false),
        RuleScope::PerUser(user_id) => &ctx.subject.id == user_id,
    }
}

fn fault_outcome(rule: &Rule, message: String) -> RuleOutcome {
    RuleOutcome::fail(rule, message)
        .with_severity(RuleSeverity::Error)
        .with_details(serde_json::json!({ "internal_error": true }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Sort failed outcomes by severity and accumulate the weighted score
fn aggregate(scoring: &ScoringConfig, outcomes: Vec<RuleOutcome>, evaluated: usize) -> EvaluationResult {
    let mut result = EvaluationResult {
        evaluated_rules: evaluated,
        ..Default::default()
    };

    for outcome in outcomes.into_iter().filter(|o| !o.passed) {
        result.score += scoring.weight(outcome.severity);
        match outcome.severity {
            RuleSeverity::Error => {
                result.is_valid = false;
                result.violations.push(outcome);
            }
            RuleSeverity::Warning => result.warnings.push(outcome),
            RuleSeverity::Info => result.notices.push(outcome),
        }
    }

    result
}
