//! Per-service ordered instance lists (C4).
//!
//! The original keeps this as a fixed array terminated by a `0` sentinel,
//! manually shifted left on removal to close gaps. A `Vec<u16>` gives the
//! exact same invariant (contiguous, no interior holes, length equals the
//! live count) for free, since `Vec::remove` already shifts the tail down;
//! there's nothing for us to get wrong that the original's shift loop
//! guarded against.
//!
//! Convention preserved from the original: `list[0]` is the service's
//! *parent* instance, the one carrying the authoritative `handle_rate`.

use onvm_proto::ManagerError;

pub struct ServiceMap {
    services: Vec<Vec<u16>>,
    max_per_service: usize,
}

impl ServiceMap {
    pub fn new(max_services: u16, max_per_service: usize) -> Self {
        Self {
            services: vec![Vec::new(); max_services as usize],
            max_per_service,
        }
    }

    /// Append `instance_id` to service `service_id`'s list.
    pub fn add(&mut self, service_id: u16, instance_id: u16) -> Result<(), ManagerError> {
        let list = &mut self.services[service_id as usize];
        if list.len() >= self.max_per_service {
            return Err(ManagerError::ServiceCountMax);
        }
        list.push(instance_id);
        Ok(())
    }

    /// Remove `instance_id` from service `service_id`'s list, if present.
    pub fn remove(&mut self, service_id: u16, instance_id: u16) {
        let list = &mut self.services[service_id as usize];
        if let Some(pos) = list.iter().position(|&id| id == instance_id) {
            list.remove(pos);
        }
    }

    pub fn count(&self, service_id: u16) -> usize {
        self.services[service_id as usize].len()
    }

    pub fn list(&self, service_id: u16) -> &[u16] {
        &self.services[service_id as usize]
    }

    /// The parent instance for a service, if any are live.
    pub fn parent(&self, service_id: u16) -> Option<u16> {
        self.services[service_id as usize].first().copied()
    }

    /// The most-recently-added instance: the sleep candidate in §4.7's
    /// decision rule 2 (`services[s][k-1]`).
    pub fn last(&self, service_id: u16) -> Option<u16> {
        self.services[service_id as usize].last().copied()
    }

    pub fn capacity(&self) -> usize {
        self.max_per_service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_preserves_contiguity() {
        let mut map = ServiceMap::new(4, 8);
        map.add(1, 10).unwrap();
        map.add(1, 20).unwrap();
        map.add(1, 30).unwrap();
        map.remove(1, 20);
        assert_eq!(map.list(1), &[10, 30]);
        assert_eq!(map.count(1), 2);
    }

    #[test]
    fn add_past_capacity_is_rejected() {
        let mut map = ServiceMap::new(1, 1);
        map.add(0, 1).unwrap();
        assert_eq!(map.add(0, 2), Err(ManagerError::ServiceCountMax));
    }

    #[test]
    fn parent_is_first_entry() {
        let mut map = ServiceMap::new(1, 4);
        map.add(0, 7).unwrap();
        map.add(0, 8).unwrap();
        assert_eq!(map.parent(0), Some(7));
        assert_eq!(map.last(0), Some(8));
    }
}
