//! Test doubles shared by the controller tests.

use anyhow::Result;
use image::DynamicImage;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::pagination::{PageEvent, PaginationController};
use crate::tmdb::{MediaGateway, MediaItem, MediaType, PageRequest, ResultPage};

pub fn item(id: u64, title: &str) -> MediaItem {
  MediaItem {
    id,
    title: title.to_string(),
    overview: None,
    poster_path: None,
    backdrop_path: None,
    vote_average: 0.0,
    release_date: None,
    media_type: MediaType::Movie,
  }
}

pub fn page(items: &[(u64, &str)], page: u32, total_pages: u32) -> ResultPage {
  ResultPage {
    items: items.iter().map(|(id, title)| item(*id, title)).collect(),
    page,
    total_pages,
    total_results: items.len() as u64,
  }
}

#[derive(Default)]
struct Script {
  responses: VecDeque<Result<ResultPage, FetchError>>,
  requests: Vec<PageRequest>,
  in_flight: usize,
  max_in_flight: usize,
  poster_requests: usize,
}

/// Gateway that answers from a queue of scripted responses.
///
/// A gated gateway holds every request until [`FakeGateway::release`] hands out permits.
#[derive(Clone, Default)]
pub struct FakeGateway {
  script: Arc<Mutex<Script>>,
  gate: Option<Arc<Semaphore>>,
}

impl FakeGateway {
  pub fn gated() -> Self {
    Self { script: Arc::default(), gate: Some(Arc::new(Semaphore::new(0))) }
  }

  pub fn push(&self, response: Result<ResultPage, FetchError>) {
    self.script.lock().unwrap().responses.push_back(response);
  }

  pub fn release(&self, permits: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(permits);
    }
  }

  pub fn requests(&self) -> Vec<PageRequest> {
    self.script.lock().unwrap().requests.clone()
  }

  pub fn max_in_flight(&self) -> usize {
    self.script.lock().unwrap().max_in_flight
  }

  pub fn poster_requests(&self) -> usize {
    self.script.lock().unwrap().poster_requests
  }
}

impl MediaGateway for FakeGateway {
  fn fetch(&self, req: PageRequest) -> impl Future<Output = Result<ResultPage, FetchError>> + Send {
    let script = Arc::clone(&self.script);
    let gate = self.gate.clone();
    async move {
      {
        let mut s = script.lock().unwrap();
        s.requests.push(req.clone());
        s.in_flight += 1;
        s.max_in_flight = s.max_in_flight.max(s.in_flight);
      }
      if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
      }
      let mut s = script.lock().unwrap();
      s.in_flight -= 1;
      s.responses.pop_front().unwrap_or_else(|| {
        Ok(ResultPage { items: Vec::new(), page: req.page, total_pages: req.page, total_results: 0 })
      })
    }
  }

  fn poster(&self, _url: String) -> impl Future<Output = Result<DynamicImage>> + Send {
    let script = Arc::clone(&self.script);
    async move {
      script.lock().unwrap().poster_requests += 1;
      Ok(DynamicImage::new_rgb8(1, 1))
    }
  }
}

/// Drive the runtime until the controller reports a completed fetch.
pub async fn next_page_event<G: MediaGateway>(ctl: &mut PaginationController<G>) -> PageEvent {
  for _ in 0..1000 {
    if let Some(event) = ctl.poll() {
      return event;
    }
    tokio::task::yield_now().await;
  }
  panic!("no page event arrived");
}
