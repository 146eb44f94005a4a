//! A mutable view of one offer's resources, partitioned for consumption.
//!
//! Three sub-pools, and every offered resource lands in at most one:
//!
//! - **unreserved atomic** — whole MOUNT disks nobody has reserved,
//!   listed per name in offer order (consumption is first-fit)
//! - **dynamically reserved** — resources carrying a `resource_id`
//!   reservation label, keyed by that id
//! - **reservable merged** — divisible quantities aggregated per role and
//!   name; unreserved resources appear under the default role
//!
//! `consume` never fails the evaluation itself: it returns `None` when a
//! requirement cannot be met and logs why, and the calling stage turns
//! that into a failing outcome for the offer.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{info, warn};

use berth_proto::{Offer, Value, DEFAULT_ROLE};

use crate::requirement::ResourceRequirement;
use crate::resource::OfferedResource;

pub struct ResourcePool {
    offer: Offer,
    unreserved_atomic: BTreeMap<String, Vec<OfferedResource>>,
    dynamically_reserved: BTreeMap<String, OfferedResource>,
    reservable_merged: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ResourcePool {
    pub fn new(offer: Offer) -> Self {
        let mut unreserved_atomic: BTreeMap<String, Vec<OfferedResource>> = BTreeMap::new();
        let mut dynamically_reserved = BTreeMap::new();
        let mut reservable_merged: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

        for resource in &offer.resources {
            let view = OfferedResource::new(resource.clone());
            if let Some(id) = view.resource_id() {
                dynamically_reserved.insert(id.to_string(), view);
            } else if view.is_atomic() {
                // Reserved atomics without an id are not consumable.
                if view.is_unreserved() {
                    unreserved_atomic
                        .entry(view.name().to_string())
                        .or_default()
                        .push(view);
                }
            } else {
                let role = view.role().to_string();
                let by_name = reservable_merged.entry(role).or_default();
                match by_name.get_mut(view.name()) {
                    Some(total) => *total = total.add(view.value()),
                    None => {
                        by_name.insert(view.name().to_string(), view.value().clone());
                    }
                }
            }
        }

        Self {
            offer,
            unreserved_atomic,
            dynamically_reserved,
            reservable_merged,
        }
    }

    /// Re-point the pool at a fresh offer, recalculating all sub-pools.
    pub fn update(&mut self, offer: Offer) {
        *self = Self::new(offer);
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    /// The dynamically reserved resource with this id, left in the pool.
    pub fn reserved_by_id(&self, resource_id: &str) -> Option<&OfferedResource> {
        self.dynamically_reserved.get(resource_id)
    }

    /// The merged quantity still available for a role and name.
    pub fn available_merged(&self, role: &str, name: &str) -> Option<&Value> {
        self.reservable_merged.get(role).and_then(|m| m.get(name))
    }

    /// Consumes a resource satisfying the requirement, or returns `None`
    /// (and logs the cause) when the offer cannot meet it.
    pub fn consume(&mut self, req: &ResourceRequirement) -> Option<OfferedResource> {
        if req.expects_resource() {
            self.consume_reserved(req)
        } else if req.atomic {
            self.consume_atomic(req)
        } else {
            self.consume_merged(req)
        }
    }

    /// Returns a previously consumed atomic resource to the pool with its
    /// reservation, persistence and volume cleared.
    pub fn release_atomic(&mut self, released: OfferedResource) {
        let mut resource = released.into_resource();
        resource.reservation = None;
        resource.reservations.clear();
        resource.role = Some(DEFAULT_ROLE.to_string());
        if let Some(disk) = resource.disk.as_mut() {
            disk.persistence = None;
            disk.volume = None;
        }
        self.unreserved_atomic
            .entry(resource.name.clone())
            .or_default()
            .push(OfferedResource::new(resource));
    }

    fn consume_reserved(&mut self, req: &ResourceRequirement) -> Option<OfferedResource> {
        let id = req.resource_id.as_deref()?;
        let existing = match self.dynamically_reserved.get(id) {
            Some(existing) => existing.clone(),
            None => {
                warn!(
                    name = %req.name,
                    resource_id = %id,
                    reserved_ids = ?self.dynamically_reserved.keys().collect::<Vec<_>>(),
                    "failed to find reserved resource in offer"
                );
                return None;
            }
        };

        if existing.is_atomic() {
            if req.value.fits_within(existing.value()) {
                return self.dynamically_reserved.remove(id);
            }
            warn!(
                name = %req.name,
                desired = ?req.value,
                reserved = ?existing.value(),
                "reserved atomic quantity is insufficient"
            );
            return None;
        }

        if existing.value().compare(&req.value) == Ordering::Greater {
            // Keep the unclaimed remainder under the same reservation id
            // and hand back exactly the desired amount.
            let mut remainder = existing.resource().clone();
            remainder.value = existing.value().subtract(&req.value);
            self.dynamically_reserved
                .insert(id.to_string(), OfferedResource::new(remainder));
            Some(OfferedResource::new(req.reserved_resource()))
        } else {
            self.dynamically_reserved.remove(id)
        }
    }

    fn consume_atomic(&mut self, req: &ResourceRequirement) -> Option<OfferedResource> {
        let atomic_resources = self.unreserved_atomic.remove(&req.name);
        let offered_count = atomic_resources.as_ref().map(|l| l.len());

        // First fit in offer order; the rest of the list is written back.
        let mut kept = Vec::new();
        let mut found = None;
        if let Some(list) = atomic_resources {
            for candidate in list {
                if found.is_none() && req.value.fits_within(candidate.value()) {
                    found = Some(candidate);
                } else {
                    kept.push(candidate);
                }
            }
        }
        if !kept.is_empty() {
            self.unreserved_atomic.insert(req.name.clone(), kept);
        }

        if found.is_none() {
            match offered_count {
                None => info!(name = %req.name, "offer lacks any atomic resources with this name"),
                Some(count) => info!(
                    name = %req.name,
                    instances = count,
                    desired = ?req.value,
                    "offered quantity in all atomic instances is insufficient"
                ),
            }
        }
        found
    }

    fn consume_merged(&mut self, req: &ResourceRequirement) -> Option<OfferedResource> {
        let Some(by_name) = self.reservable_merged.get_mut(&req.role) else {
            info!(role = %req.role, "no reservable resources available in role");
            return None;
        };

        match by_name.get(&req.name) {
            Some(available) if req.value.fits_within(available) => {
                let remaining = available.subtract(&req.value);
                by_name.insert(req.name.clone(), remaining);
                Some(OfferedResource::new(req.unreserved_resource()))
            }
            Some(available) => {
                info!(
                    name = %req.name,
                    desired = ?req.value,
                    offered = ?available,
                    "offered quantity is insufficient"
                );
                None
            }
            None => {
                info!(name = %req.name, role = %req.role, "offer lacks any resources with this name");
                None
            }
        }
    }
}
