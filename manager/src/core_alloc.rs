//! Per-CPU-core NF accounting (C2).
//!
//! Tracks how many NFs are bound to each core and whether a core has been
//! claimed exclusively. The controller is the only writer; it consults
//! this table on every admit and every stop.

use onvm_proto::ManagerError;

#[derive(Debug, Clone, Copy, Default)]
struct CoreSlot {
    nf_count: u16,
    is_dedicated: bool,
}

/// Fixed-size per-core accounting table.
pub struct CoreTable {
    cores: Vec<CoreSlot>,
}

impl CoreTable {
    pub fn new(num_cores: u16) -> Self {
        Self {
            cores: vec![CoreSlot::default(); num_cores as usize],
        }
    }

    pub fn nf_count(&self, core_id: u16) -> u16 {
        self.cores[core_id as usize].nf_count
    }

    pub fn is_dedicated(&self, core_id: u16) -> bool {
        self.cores[core_id as usize].is_dedicated
    }

    /// Assign a core under `options`. `hint`, if given, is the specific
    /// core requested (required for `Dedicated`, preferred for `Shared`).
    /// A dedicated request fails if the hinted core already has any NF on
    /// it; a shared request fails only against a core already dedicated.
    pub fn acquire(
        &mut self,
        hint: Option<u16>,
        dedicated: bool,
    ) -> Result<u16, ManagerError> {
        if dedicated {
            let core_id = hint.ok_or(ManagerError::NoCoreCapacity)?;
            let slot = self
                .cores
                .get_mut(core_id as usize)
                .ok_or(ManagerError::NoCoreCapacity)?;
            if slot.nf_count > 0 {
                return Err(ManagerError::NoCoreCapacity);
            }
            slot.nf_count = 1;
            slot.is_dedicated = true;
            return Ok(core_id);
        }

        if let Some(core_id) = hint {
            let slot = self
                .cores
                .get_mut(core_id as usize)
                .ok_or(ManagerError::NoCoreCapacity)?;
            if slot.is_dedicated {
                return Err(ManagerError::NoCoreCapacity);
            }
            slot.nf_count += 1;
            return Ok(core_id);
        }

        // No hint: pick the least-loaded non-dedicated core.
        let (core_id, slot) = self
            .cores
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| !s.is_dedicated)
            .min_by_key(|(_, s)| s.nf_count)
            .ok_or(ManagerError::NoCoreCapacity)?;
        slot.nf_count += 1;
        Ok(core_id as u16)
    }

    /// Release one NF's claim on `core_id`, clearing `is_dedicated` once
    /// the core goes empty.
    pub fn release(&mut self, core_id: u16) {
        let slot = &mut self.cores[core_id as usize];
        slot.nf_count = slot.nf_count.saturating_sub(1);
        if slot.nf_count == 0 {
            slot.is_dedicated = false;
        }
    }

    /// Move one NF's accounting from `old_core` to `new_core` (§4.5 step
    /// 9's reassignment). The candidate is always a shared-mode NF, so
    /// `is_dedicated` never needs touching here.
    pub fn relocate(&mut self, old_core: u16, new_core: u16) {
        self.cores[old_core as usize].nf_count = self.cores[old_core as usize].nf_count.saturating_sub(1);
        self.cores[new_core as usize].nf_count += 1;
    }

    /// When `freed_core` has just gone empty and core reassignment is
    /// enabled, find the instance on the most-loaded other core whose
    /// migration would most reduce imbalance. Ties broken by lowest
    /// instance id; the caller supplies the live-instance listing (the
    /// core table itself only knows counts, not which ids live where).
    pub fn find_reassignment_candidate<'a>(
        &self,
        freed_core: u16,
        instances_by_core: impl Iterator<Item = (u16, &'a [u16])>,
    ) -> Option<u16> {
        let mut best: Option<(u16, u16)> = None; // (core_nf_count, instance_id)
        for (core_id, instances) in instances_by_core {
            if core_id == freed_core || instances.is_empty() {
                continue;
            }
            let count = self.nf_count(core_id);
            let candidate = *instances.iter().min()?;
            let better = match best {
                None => true,
                Some((best_count, best_id)) => {
                    count > best_count || (count == best_count && candidate < best_id)
                }
            };
            if better {
                best = Some((count, candidate));
            }
        }
        best.map(|(_, id)| id)
    }
}
