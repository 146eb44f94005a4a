//! What a single evaluation stage asks the pool for.

use berth_proto::{Labels, ReservationInfo, Resource, Value};

use crate::resource::RESOURCE_ID_LABEL;

/// One resource demand handed to `ResourcePool::consume`. The pool
/// dispatches on three predicates: a requirement that carries a known
/// reservation id *expects* that exact reservation to be present; an
/// atomic requirement wants a whole MOUNT disk; everything else
/// *reserves* out of the role's merged pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequirement {
    pub name: String,
    pub value: Value,
    pub role: String,
    pub principal: Option<String>,
    /// Present when rebinding an existing reservation.
    pub resource_id: Option<String>,
    /// Whole-disk consumption; never partially satisfied.
    pub atomic: bool,
}

impl ResourceRequirement {
    pub fn new(name: impl Into<String>, value: Value, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            role: role.into(),
            principal: None,
            resource_id: None,
            atomic: false,
        }
    }

    pub fn with_principal(mut self, principal: Option<String>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    pub fn expects_resource(&self) -> bool {
        self.resource_id.is_some()
    }

    /// The exactly-desired resource carrying the expected reservation,
    /// returned when the pool splits a larger reservation.
    pub fn reserved_resource(&self) -> Resource {
        let mut labels = Labels::default();
        if let Some(id) = &self.resource_id {
            labels.set(RESOURCE_ID_LABEL, id.clone());
        }
        let mut resource = Resource::new(self.name.clone(), self.value.clone())
            .with_role(self.role.clone());
        resource.reservations.push(ReservationInfo {
            role: Some(self.role.clone()),
            principal: self.principal.clone(),
            labels,
        });
        resource
    }

    /// The desired quantity as a not-yet-reserved resource in the
    /// requested role; the consuming stage appends the reservation.
    pub fn unreserved_resource(&self) -> Resource {
        Resource::new(self.name.clone(), self.value.clone()).with_role(self.role.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::OfferedResource;

    #[test]
    fn reserved_resource_carries_the_expected_id() {
        let req = ResourceRequirement::new("cpus", Value::Scalar(0.5), "svc-role")
            .with_principal(Some("svc-principal".to_string()))
            .with_resource_id(Some("r1".to_string()));

        let view = OfferedResource::new(req.reserved_resource());
        assert_eq!(view.resource_id(), Some("r1"));
        assert_eq!(view.role(), "svc-role");
        assert_eq!(view.value(), &Value::Scalar(0.5));
    }

    #[test]
    fn unreserved_resource_has_no_reservation() {
        let req = ResourceRequirement::new("mem", Value::Scalar(256.0), "svc-role");
        let resource = req.unreserved_resource();
        assert!(!resource.has_reservation());
        assert_eq!(resource.role.as_deref(), Some("svc-role"));
    }
}
