//! Approval gate for AI-proposed actions.

use crate::{
    error::AppError,
    models::{ai::AiSettings, automation::Action},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Execute now and record the action as `executed`
    AutoApprove,
    /// Store as `pending` for an agent to decide
    RequireApproval,
}

fn check_confidence(confidence: f64) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(AppError::InvalidRequest(
            "confidence must be between 0 and 1".to_string(),
        ));
    }
    Ok(())
}

/// Decide how a proposal is handled.
///
/// Auto-approval requires the action kind to be listed in
/// `auto_approve_kinds` and a confidence at or above the threshold. A
/// proposal without a confidence always waits for a human.
pub fn decide(
    settings: &AiSettings,
    action: &Action,
    confidence: Option<f64>,
) -> Result<GateDecision, AppError> {
    if !settings.enabled {
        return Err(AppError::Conflict(
            "AI assist is disabled for this workspace".to_string(),
        ));
    }
    action.validate()?;
    if let Some(confidence) = confidence {
        check_confidence(confidence)?;
    }

    let kind_allowed = settings
        .auto_approve_kinds
        .iter()
        .any(|kind| kind == action.kind());

    Ok(match confidence {
        Some(c) if kind_allowed && c >= settings.auto_approve_threshold => GateDecision::AutoApprove,
        _ => GateDecision::RequireApproval,
    })
}

/// Validate values before saving AI settings.
pub fn validate_settings(threshold: f64, kinds: &[String]) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AppError::InvalidRequest(
            "auto_approve_threshold must be between 0 and 1".to_string(),
        ));
    }
    if let Some(unknown) = kinds.iter().find(|k| !Action::KINDS.contains(&k.as_str())) {
        return Err(AppError::InvalidRequest(format!(
            "unknown action kind '{unknown}'"
        )));
    }
    Ok(())
}
