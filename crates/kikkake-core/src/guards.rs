//! Step-level trigger queries.

use crate::step::StepConfig;
use crate::trigger::{CronTrigger, HttpTrigger, QueueTrigger, StateTrigger, StreamTrigger, Trigger};

pub fn is_api_step(config: &StepConfig) -> bool {
    config.triggers.iter().any(Trigger::is_http)
}

pub fn is_queue_step(config: &StepConfig) -> bool {
    config.triggers.iter().any(Trigger::is_queue)
}

pub fn is_cron_step(config: &StepConfig) -> bool {
    config.triggers.iter().any(Trigger::is_cron)
}

pub fn is_state_step(config: &StepConfig) -> bool {
    config.triggers.iter().any(Trigger::is_state)
}

pub fn is_stream_step(config: &StepConfig) -> bool {
    config.triggers.iter().any(Trigger::is_stream)
}

/// A step with no triggers, kept for documentation and flow diagrams.
pub fn is_noop_step(config: &StepConfig) -> bool {
    config.triggers.is_empty()
}

pub fn get_api_triggers(config: &StepConfig) -> Vec<&HttpTrigger> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::Http(t) => Some(t),
            _ => None,
        })
        .collect()
}

pub fn get_queue_triggers(config: &StepConfig) -> Vec<&QueueTrigger> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::Queue(t) => Some(t),
            _ => None,
        })
        .collect()
}

pub fn get_cron_triggers(config: &StepConfig) -> Vec<&CronTrigger> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::Cron(t) => Some(t),
            _ => None,
        })
        .collect()
}

pub fn get_state_triggers(config: &StepConfig) -> Vec<&StateTrigger> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::State(t) => Some(t),
            _ => None,
        })
        .collect()
}

pub fn get_stream_triggers(config: &StepConfig) -> Vec<&StreamTrigger> {
    config
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::Stream(t) => Some(t),
            _ => None,
        })
        .collect()
}
