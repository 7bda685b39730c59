use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use super::types::{SegmentationMask, SegmentationOptions, Segmenter};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::scheduler::{BackendStatus, InferenceBackend};

enum WorkerEvent {
    Loaded,
    LoadFailed(String),
    Finished(std::result::Result<SegmentationMask, String>),
}

/// Runs a [`Segmenter`] on its own thread.
///
/// The model is loaded on that thread, so a slow load never blocks the
/// caller. Frames go in through [`InferenceBackend::submit`]; masks come back
/// through [`InferenceBackend::poll`], which never blocks.
pub struct InferenceWorker {
    requests: Option<Sender<Frame>>,
    events: Receiver<WorkerEvent>,
    status: BackendStatus,
    handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    pub fn spawn<F>(loader: F, options: SegmentationOptions) -> Result<Self>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn Segmenter + Send>> + Send + 'static,
    {
        options.validate()?;

        let (request_tx, request_rx) = mpsc::channel::<Frame>();
        let (event_tx, event_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("segmenter".into())
            .spawn(move || worker_loop(loader, options, request_rx, event_tx))
            .map_err(|e| Error::ModelUnavailable(format!("failed to start segmenter thread: {e}")))?;

        Ok(Self {
            requests: Some(request_tx),
            events: event_rx,
            status: BackendStatus::Loading,
            handle: Some(handle),
        })
    }
}

fn worker_loop<F>(
    loader: F,
    options: SegmentationOptions,
    requests: Receiver<Frame>,
    events: Sender<WorkerEvent>,
) where
    F: FnOnce() -> anyhow::Result<Box<dyn Segmenter + Send>>,
{
    let mut model = match loader() {
        Ok(model) => {
            tracing::info!("Segmentation model ready");
            let _ = events.send(WorkerEvent::Loaded);
            model
        }
        Err(e) => {
            tracing::error!("Segmentation model failed to load: {e:#}");
            let _ = events.send(WorkerEvent::LoadFailed(format!("{e:#}")));
            return;
        }
    };

    while let Ok(frame) = requests.recv() {
        let result = model.segment(&frame, &options).map_err(|e| format!("{e:#}"));
        if events.send(WorkerEvent::Finished(result)).is_err() {
            break;
        }
    }

    tracing::debug!("Segmenter thread exiting");
}

impl InferenceBackend for InferenceWorker {
    fn status(&mut self) -> BackendStatus {
        if self.status == BackendStatus::Loading {
            match self.events.try_recv() {
                Ok(WorkerEvent::Loaded) => self.status = BackendStatus::Ready,
                Ok(WorkerEvent::LoadFailed(reason)) => self.status = BackendStatus::Failed(reason),
                Ok(WorkerEvent::Finished(_)) => {}
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.status = BackendStatus::Failed("segmenter thread stopped while loading".into())
                }
            }
        }
        self.status.clone()
    }

    fn submit(&mut self, frame: Frame) -> Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::ModelUnavailable("segmenter shut down".into()))?;
        requests.send(frame).map_err(|_| {
            self.status = BackendStatus::Failed("segmenter thread stopped".into());
            Error::ModelUnavailable("segmenter thread stopped".into())
        })
    }

    fn poll(&mut self) -> Option<Result<SegmentationMask>> {
        match self.events.try_recv() {
            Ok(WorkerEvent::Finished(result)) => Some(result.map_err(Error::InferenceFailure)),
            Ok(_) | Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.status = BackendStatus::Failed("segmenter thread stopped".into());
                Some(Err(Error::InferenceFailure("segmenter thread stopped".into())))
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
