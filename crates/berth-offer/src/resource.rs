//! Semantic view over an offered resource.
//!
//! Raw `Resource` messages bury their meaning in the interplay of the
//! role field, the deprecated single reservation, the reservation stack,
//! and reservation labels. `OfferedResource` answers the questions the
//! pool and the evaluation stages actually ask: is it atomic, is it
//! reserved, under which role, with which reservation id.

use berth_proto::{DiskSourceKind, ReservationInfo, Resource, Value, DEFAULT_ROLE};

/// Reservation label carrying the id minted at RESERVE time.
pub const RESOURCE_ID_LABEL: &str = "resource_id";
/// Reservation label naming the port spec a dynamically-allocated port
/// was chosen for.
pub const DYNAMIC_PORT_LABEL: &str = "dynamic_port";
/// Reservation labels carrying a named VIP's name and port.
pub const VIP_NAME_LABEL: &str = "vip_key";
pub const VIP_PORT_LABEL: &str = "vip_value";

/// Wrapper around an offered `Resource`, combined with the resource id
/// extracted from its reservation labels.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferedResource {
    resource: Resource,
    resource_id: Option<String>,
}

impl OfferedResource {
    pub fn new(resource: Resource) -> Self {
        let resource_id = extract_resource_id(&resource);
        Self {
            resource,
            resource_id,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn into_resource(self) -> Resource {
        self.resource
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }

    pub fn value(&self) -> &Value {
        &self.resource.value
    }

    /// A resource that cannot be partially consumed: a disk backed by a
    /// whole MOUNT device.
    pub fn is_atomic(&self) -> bool {
        self.resource
            .disk
            .as_ref()
            .and_then(|d| d.source.as_ref())
            .is_some_and(|s| s.kind == DiskSourceKind::Mount)
    }

    pub fn has_resource_id(&self) -> bool {
        self.resource_id.is_some()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn has_reservation(&self) -> bool {
        self.resource.has_reservation()
    }

    pub fn is_unreserved(&self) -> bool {
        // A resource-level default role wins over any reservation entries.
        if self.resource.role.as_deref() == Some(DEFAULT_ROLE) {
            return true;
        }
        self.resource.reservation.is_none() && self.resource.reservations.is_empty()
    }

    pub fn is_reserved(&self) -> bool {
        !self.is_unreserved()
    }

    /// Effective role: the last reservation-stack entry, else the
    /// deprecated single reservation, else the resource-level role, else
    /// the default role. This precedence is protocol-level; keep it.
    pub fn role(&self) -> &str {
        if let Some(entry) = self.resource.reservations.last() {
            if let Some(role) = entry.role.as_deref() {
                return role;
            }
        }

        if let Some(reservation) = &self.resource.reservation {
            if let Some(role) = reservation.role.as_deref() {
                return role;
            }
        }

        if let Some(role) = self.resource.role.as_deref() {
            return role;
        }

        DEFAULT_ROLE
    }

    /// Principal from the deprecated single-reservation field.
    pub fn principal(&self) -> Option<&str> {
        self.resource
            .reservation
            .as_ref()
            .and_then(|r| r.principal.as_deref())
    }

    /// Looks up a reservation label, newest reservation entry first, the
    /// deprecated single field last.
    pub fn reservation_label(&self, key: &str) -> Option<&str> {
        for entry in self.resource.reservations.iter().rev() {
            if let Some(value) = entry.labels.get(key) {
                return Some(value);
            }
        }
        self.resource
            .reservation
            .as_ref()
            .and_then(|r| r.labels.get(key))
    }
}

/// Finds the newest non-empty `resource_id` label: the deprecated single
/// reservation is considered oldest, then the stack in order, and the
/// newest match wins.
fn extract_resource_id(resource: &Resource) -> Option<String> {
    let mut reservations: Vec<&ReservationInfo> = Vec::new();
    if let Some(single) = &resource.reservation {
        if !single.labels.is_empty() {
            reservations.push(single);
        }
    }
    for entry in &resource.reservations {
        if !entry.labels.is_empty() {
            reservations.push(entry);
        }
    }

    reservations
        .iter()
        .rev()
        .find_map(|r| r.labels.get(RESOURCE_ID_LABEL))
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_proto::{DiskInfo, DiskSource, Labels};

    fn reservation(role: &str, resource_id: Option<&str>) -> ReservationInfo {
        let mut labels = Labels::default();
        if let Some(id) = resource_id {
            labels.set(RESOURCE_ID_LABEL, id);
        }
        ReservationInfo {
            role: Some(role.to_string()),
            principal: Some("svc-principal".to_string()),
            labels,
        }
    }

    #[test]
    fn plain_resource_is_unreserved() {
        let r = OfferedResource::new(Resource::new("cpus", Value::Scalar(2.0)));
        assert!(r.is_unreserved());
        assert!(!r.has_resource_id());
        assert_eq!(r.role(), DEFAULT_ROLE);
    }

    #[test]
    fn default_role_wins_over_reservation_entries() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0)).with_role(DEFAULT_ROLE);
        resource.reservations.push(reservation("svc-role", None));
        assert!(OfferedResource::new(resource).is_unreserved());
    }

    #[test]
    fn role_prefers_last_stack_entry() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0)).with_role("static-role");
        resource.reservation = Some(reservation("old-role", None));
        resource.reservations.push(reservation("base-role", None));
        resource.reservations.push(reservation("refined-role", None));

        let r = OfferedResource::new(resource);
        assert_eq!(r.role(), "refined-role");
        assert!(r.is_reserved());
    }

    #[test]
    fn role_falls_back_to_deprecated_then_static() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0)).with_role("static-role");
        resource.reservation = Some(reservation("old-role", None));
        assert_eq!(OfferedResource::new(resource).role(), "old-role");

        let resource = Resource::new("cpus", Value::Scalar(2.0)).with_role("static-role");
        assert_eq!(OfferedResource::new(resource).role(), "static-role");
    }

    #[test]
    fn newest_resource_id_wins() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0));
        resource.reservation = Some(reservation("svc-role", Some("deprecated-id")));
        resource.reservations.push(reservation("svc-role", Some("stack-id")));

        let r = OfferedResource::new(resource);
        assert_eq!(r.resource_id(), Some("stack-id"));
    }

    #[test]
    fn deprecated_resource_id_is_a_fallback() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0));
        resource.reservation = Some(reservation("svc-role", Some("deprecated-id")));
        resource.reservations.push(reservation("svc-role", None));

        let r = OfferedResource::new(resource);
        assert_eq!(r.resource_id(), Some("deprecated-id"));
    }

    #[test]
    fn empty_resource_id_label_is_ignored() {
        let mut resource = Resource::new("cpus", Value::Scalar(2.0));
        resource.reservations.push(reservation("svc-role", Some("")));
        assert!(!OfferedResource::new(resource).has_resource_id());
    }

    #[test]
    fn mount_disk_is_atomic() {
        let resource = Resource::new("disk", Value::Scalar(50_000.0)).with_disk(DiskInfo {
            source: Some(DiskSource {
                kind: DiskSourceKind::Mount,
                root: Some("/mnt/data-1".to_string()),
            }),
            persistence: None,
            volume: None,
        });
        assert!(OfferedResource::new(resource).is_atomic());

        let root_disk = Resource::new("disk", Value::Scalar(50_000.0));
        assert!(!OfferedResource::new(root_disk).is_atomic());
    }
}
