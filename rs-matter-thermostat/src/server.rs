/*
 *
 *    Copyright (c) 2020-2024 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The registry of all Thermostat cluster instances of a node, and the task that rolls
//! back atomic writes once their deadline passes.

use core::cell::RefCell;
use core::pin::pin;
use core::time::Duration;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;

use log::{debug, info};

use crate::dm::clusters::thermostat::{SessionToken, ThermostatCluster, ThermostatDelegate};
use crate::error::{Error, ErrorCode};
use crate::utils::epoch::Epoch;

/// Up to `N` thermostat endpoints, each with its own delegate.
///
/// `epoch` has to be the clock the clusters were created with.
pub struct ThermostatServer<M, D, const N: usize>
where
    M: RawMutex,
{
    endpoints: Mutex<M, RefCell<heapless::Vec<ThermostatCluster<D>, N>>>,
    notification: Signal<M, ()>,
    epoch: Epoch,
}

impl<M, D, const N: usize> ThermostatServer<M, D, N>
where
    M: RawMutex,
    D: ThermostatDelegate,
{
    #[inline(always)]
    pub const fn new(epoch: Epoch) -> Self {
        Self {
            endpoints: Mutex::new(RefCell::new(heapless::Vec::new())),
            notification: Signal::new(),
            epoch,
        }
    }

    /// Register the cluster of one endpoint.
    pub fn add_endpoint(&self, cluster: ThermostatCluster<D>) -> Result<(), Error> {
        self.endpoints.lock(|endpoints| -> Result<(), Error> {
            let mut endpoints = endpoints.borrow_mut();

            if endpoints
                .iter()
                .any(|c| c.endpoint_id() == cluster.endpoint_id())
            {
                Err(ErrorCode::Duplicate)?;
            }

            info!("Registered thermostat endpoint {}", cluster.endpoint_id());

            endpoints
                .push(cluster)
                .map_err(|_| ErrorCode::NoSpace.into())
        })
    }

    /// Run `f` on the cluster of `endpoint_id`.
    ///
    /// Wakes up the deadline runner if `f` opened or closed an atomic write.
    pub fn with<F, R>(&self, endpoint_id: u16, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut ThermostatCluster<D>) -> Result<R, Error>,
    {
        let (result, rearm) = self.endpoints.lock(|endpoints| {
            let mut endpoints = endpoints.borrow_mut();

            let cluster = endpoints
                .iter_mut()
                .find(|c| c.endpoint_id() == endpoint_id)
                .ok_or(ErrorCode::EndpointNotFound)?;

            let token = cluster.token();
            let result = f(cluster);

            Ok::<_, Error>((result, token != cluster.token()))
        })?;

        if rearm {
            self.notify();
        }

        result
    }

    /// Wake up the deadline runner so that it re-reads the deadlines.
    pub fn notify(&self) {
        self.notification.signal(());
    }

    /// The deadline of the session `token` of `endpoint_id` passed.
    pub fn on_timeout(&self, endpoint_id: u16, token: SessionToken) -> Result<bool, Error> {
        self.with(endpoint_id, |cluster| Ok(cluster.on_timeout(token)))
    }

    /// The earliest deadline of all open atomic writes.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.endpoints.lock(|endpoints| {
            endpoints
                .borrow()
                .iter()
                .filter_map(|c| c.deadline())
                .min()
        })
    }

    /// Roll back every atomic write whose deadline passed. Returns how many were.
    pub fn expire_due(&self) -> usize {
        self.endpoints.lock(|endpoints| {
            endpoints
                .borrow_mut()
                .iter_mut()
                .filter_map(|c| c.expire_due().then_some(c.endpoint_id()))
                .inspect(|endpoint_id| info!("Atomic write on endpoint {} expired", endpoint_id))
                .count()
        })
    }

    /// Roll back atomic writes as their deadlines pass. Never returns.
    pub async fn run(&self) -> Result<(), Error> {
        loop {
            self.expire_due();

            let mut notification = pin!(self.notification.wait());

            match self.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_sub((self.epoch)());
                    debug!("Next atomic write deadline in {}ms", wait.as_millis());

                    let mut timer = pin!(Timer::after(embassy_time::Duration::from_micros(
                        wait.as_micros() as u64
                    )));

                    select(&mut notification, &mut timer).await;
                }
                None => notification.await,
            }
        }
    }
}
