//! In-memory collaborators for reconciler tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::database::models::StoredSourceState;
use crate::database::repositories::{DestinationRepository, SourceStateRepository};
use crate::domain::{ChannelState, Destination, DestinationStatus, DestinationUpdate, SourceState};
use crate::pipeline::{EncodingProfile, PipelineError, PipelineProvisioner, PipelineRefs, profile};
use crate::source::{ProbeError, SourceProber, SourceSnapshot};
use crate::{Error, Result};

// ========== Destination store ==========

#[derive(Default)]
pub struct InMemoryDestinationRepository {
    items: Mutex<Vec<Destination>>,
}

impl InMemoryDestinationRepository {
    pub fn insert(&self, destination: Destination) {
        self.items.lock().unwrap().push(destination);
    }

    pub fn get(&self, id: &str) -> Destination {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .unwrap()
    }

    pub fn status_of(&self, id: &str) -> DestinationStatus {
        self.get(id).status
    }

    pub fn force_status(&self, id: &str, status: DestinationStatus) {
        let mut items = self.items.lock().unwrap();
        if let Some(d) = items.iter_mut().find(|d| d.id == id) {
            d.status = status;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    fn with_mut<T>(&self, id: &str, f: impl FnOnce(&mut Destination) -> T) -> Result<T> {
        let mut items = self.items.lock().unwrap();
        let dest = items
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("Destination", id))?;
        Ok(f(dest))
    }

    fn filtered(&self, pred: impl Fn(&Destination) -> bool) -> Vec<Destination> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|d| pred(d))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DestinationRepository for InMemoryDestinationRepository {
    async fn get_destination(&self, id: &str) -> Result<Destination> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Destination", id))
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>> {
        Ok(self.filtered(|_| true))
    }

    async fn list_destinations_page(&self, limit: u32, offset: u32) -> Result<Vec<Destination>> {
        Ok(self
            .filtered(|_| true)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_destinations(&self) -> Result<u64> {
        Ok(self.items.lock().unwrap().len() as u64)
    }

    async fn list_startable(&self) -> Result<Vec<Destination>> {
        Ok(self.filtered(|d| d.is_startable()))
    }

    async fn list_by_status(&self, status: DestinationStatus) -> Result<Vec<Destination>> {
        Ok(self.filtered(|d| d.status == status))
    }

    async fn list_retryable(&self) -> Result<Vec<Destination>> {
        Ok(self.filtered(|d| {
            d.enabled
                && (d.status == DestinationStatus::Starting
                    || (d.status == DestinationStatus::Inactive && d.start_retry))
        }))
    }

    async fn create_destination(&self, destination: &Destination) -> Result<()> {
        self.insert(destination.clone());
        Ok(())
    }

    async fn update_settings(&self, id: &str, update: &DestinationUpdate) -> Result<Destination> {
        self.with_mut(id, |d| {
            update.apply_to(d);
            d.clone()
        })
    }

    async fn transition_status(
        &self,
        id: &str,
        from: DestinationStatus,
        to: DestinationStatus,
    ) -> Result<bool> {
        from.transition_to(to)?;
        self.with_mut(id, |d| -> Result<bool> {
            if d.status != from {
                return Ok(false);
            }
            d.transition_to(to)?;
            Ok(true)
        })?
    }

    async fn attach_pipeline(
        &self,
        id: &str,
        expected_channel_ref: Option<&str>,
        channel_ref: &str,
        input_ref: &str,
    ) -> Result<bool> {
        self.with_mut(id, |d| -> Result<bool> {
            if d.pipeline_channel_ref.as_deref() != expected_channel_ref {
                return Ok(false);
            }
            d.pipeline_channel_ref = Some(channel_ref.to_string());
            d.pipeline_input_ref = Some(input_ref.to_string());
            d.status = DestinationStatus::Starting;
            d.pipeline_stale = false;
            d.updated_at = Utc::now();
            Ok(true)
        })?
    }

    async fn detach_pipeline(&self, id: &str, expected_channel_ref: &str) -> Result<bool> {
        self.with_mut(id, |d| {
            if d.status != DestinationStatus::Inactive
                || d.pipeline_channel_ref.as_deref() != Some(expected_channel_ref)
            {
                return false;
            }
            d.pipeline_channel_ref = None;
            d.pipeline_input_ref = None;
            d.pipeline_stale = false;
            d.updated_at = Utc::now();
            true
        })
    }

    async fn set_status(&self, id: &str, status: DestinationStatus) -> Result<()> {
        self.with_mut(id, |d| -> Result<()> {
            if status.requires_pipeline() && d.pipeline_channel_ref.is_none() {
                return Err(Error::Database("status requires a pipeline channel".into()));
            }
            d.status = status;
            d.updated_at = Utc::now();
            Ok(())
        })?
    }

    async fn set_start_retry(&self, id: &str, retry: bool) -> Result<()> {
        self.with_mut(id, |d| {
            d.start_retry = retry;
            d.updated_at = Utc::now();
        })
    }

    async fn delete_destination(&self, id: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|d| d.id != id);
        if items.len() == before {
            return Err(Error::not_found("Destination", id));
        }
        Ok(())
    }
}

// ========== Source state store ==========

#[derive(Default)]
pub struct InMemorySourceStateRepository {
    state: Mutex<Option<StoredSourceState>>,
}

impl InMemorySourceStateRepository {
    pub fn set(&self, state: SourceState) {
        *self.state.lock().unwrap() = Some(StoredSourceState {
            state,
            updated_at: Utc::now(),
        });
    }

    pub fn current(&self) -> Option<SourceState> {
        self.state.lock().unwrap().map(|s| s.state)
    }
}

#[async_trait]
impl SourceStateRepository for InMemorySourceStateRepository {
    async fn get_source_state(&self) -> Result<Option<StoredSourceState>> {
        Ok(*self.state.lock().unwrap())
    }

    async fn put_source_state(&self, state: SourceState) -> Result<()> {
        self.set(state);
        Ok(())
    }
}

// ========== Prober ==========

pub struct FakeProber {
    state: Mutex<std::result::Result<SourceState, String>>,
    calls: AtomicUsize,
}

impl Default for FakeProber {
    fn default() -> Self {
        Self {
            state: Mutex::new(Ok(SourceState::Offline)),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeProber {
    pub fn set_state(&self, state: SourceState) {
        *self.state.lock().unwrap() = Ok(state);
    }

    pub fn fail_with(&self, message: &str) {
        *self.state.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProber for FakeProber {
    async fn probe(&self) -> std::result::Result<SourceSnapshot, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap().clone();
        match state {
            Ok(state) => Ok(SourceSnapshot {
                state,
                ..SourceSnapshot::offline()
            }),
            Err(message) => Err(ProbeError::UnexpectedStatus {
                status: 500,
                body: message,
            }),
        }
    }
}

// ========== Provisioner ==========

#[derive(Default)]
struct ProvisionerState {
    channels: HashMap<String, ChannelState>,
    inputs: HashSet<String>,
    next_id: usize,
    created: usize,
    created_profiles: Vec<EncodingProfile>,
    started: usize,
    stop_calls: Vec<String>,
    deleted_channels: Vec<String>,
    deleted_inputs: Vec<String>,
    fail_create_names: HashSet<String>,
    fail_starts: bool,
    fail_stop: HashSet<String>,
    fail_delete_channel: HashSet<String>,
    start_delay: Option<Duration>,
}

/// Encoding service double keeping channel state in memory.
#[derive(Default)]
pub struct FakeProvisioner {
    inner: Mutex<ProvisionerState>,
}

impl FakeProvisioner {
    pub fn put_channel(&self, channel_ref: &str, state: ChannelState) {
        self.inner
            .lock()
            .unwrap()
            .channels
            .insert(channel_ref.to_string(), state);
    }

    pub fn put_input(&self, input_ref: &str) {
        self.inner
            .lock()
            .unwrap()
            .inputs
            .insert(input_ref.to_string());
    }

    pub fn channel_state(&self, channel_ref: &str) -> Option<ChannelState> {
        self.inner.lock().unwrap().channels.get(channel_ref).cloned()
    }

    pub fn has_channel(&self, channel_ref: &str) -> bool {
        self.inner.lock().unwrap().channels.contains_key(channel_ref)
    }

    pub fn has_input(&self, input_ref: &str) -> bool {
        self.inner.lock().unwrap().inputs.contains(input_ref)
    }

    /// Encoding profiles of every pipeline created so far, in order.
    pub fn created_profiles(&self) -> Vec<EncodingProfile> {
        self.inner.lock().unwrap().created_profiles.clone()
    }

    pub fn fail_create_for(&self, destination_name: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_create_names
            .insert(destination_name.to_string());
    }

    pub fn fail_starts(&self) {
        self.inner.lock().unwrap().fail_starts = true;
    }

    pub fn fail_stop(&self, channel_ref: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_stop
            .insert(channel_ref.to_string());
    }

    pub fn fail_delete_channel(&self, channel_ref: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_delete_channel
            .insert(channel_ref.to_string());
    }

    pub fn stall_starts(&self, delay: Duration) {
        self.inner.lock().unwrap().start_delay = Some(delay);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_create_names.clear();
        inner.fail_starts = false;
        inner.fail_stop.clear();
        inner.fail_delete_channel.clear();
        inner.start_delay = None;
    }

    pub fn create_count(&self) -> usize {
        self.inner.lock().unwrap().created
    }

    pub fn start_count(&self) -> usize {
        self.inner.lock().unwrap().started
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().stop_calls.clone()
    }

    pub fn deleted_channels(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_channels.clone()
    }

    pub fn deleted_inputs(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_inputs.clone()
    }
}

fn rejected(message: &str) -> PipelineError {
    PipelineError::Rejected {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl PipelineProvisioner for FakeProvisioner {
    async fn create_pipeline(
        &self,
        destination: &Destination,
    ) -> std::result::Result<PipelineRefs, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create_names.contains(&destination.name) {
            return Err(rejected("quota exceeded"));
        }
        inner.next_id += 1;
        inner.created += 1;
        inner.created_profiles.push(profile::select(
            destination.platform.is_vertical(),
            destination.vertical_mode,
        ));
        let channel_ref = format!("ch-{}", inner.next_id);
        let input_ref = format!("in-{}", inner.next_id);
        inner
            .channels
            .insert(channel_ref.clone(), ChannelState::Idle);
        inner.inputs.insert(input_ref.clone());
        Ok(PipelineRefs {
            channel_ref,
            input_ref,
        })
    }

    async fn describe_channel(
        &self,
        channel_ref: &str,
    ) -> std::result::Result<ChannelState, PipelineError> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .get(channel_ref)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(channel_ref.to_string()))
    }

    async fn start_channel(&self, channel_ref: &str) -> std::result::Result<(), PipelineError> {
        let delay = self.inner.lock().unwrap().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.fail_starts {
            return Err(rejected("start refused"));
        }
        match inner.channels.get_mut(channel_ref) {
            Some(state) => *state = ChannelState::Running,
            None => return Err(PipelineError::NotFound(channel_ref.to_string())),
        }
        inner.started += 1;
        Ok(())
    }

    async fn stop_channel(&self, channel_ref: &str) -> std::result::Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stop_calls.push(channel_ref.to_string());
        if inner.fail_stop.contains(channel_ref) {
            return Err(rejected("stop refused"));
        }
        match inner.channels.get_mut(channel_ref) {
            Some(state) => {
                *state = ChannelState::Idle;
                Ok(())
            }
            None => Err(PipelineError::NotFound(channel_ref.to_string())),
        }
    }

    async fn delete_channel(&self, channel_ref: &str) -> std::result::Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_delete_channel.contains(channel_ref) {
            return Err(rejected("delete refused"));
        }
        if inner.channels.remove(channel_ref).is_none() {
            return Err(PipelineError::NotFound(channel_ref.to_string()));
        }
        inner.deleted_channels.push(channel_ref.to_string());
        Ok(())
    }

    async fn delete_input(&self, input_ref: &str) -> std::result::Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.inputs.remove(input_ref) {
            return Err(PipelineError::NotFound(input_ref.to_string()));
        }
        inner.deleted_inputs.push(input_ref.to_string());
        Ok(())
    }
}
