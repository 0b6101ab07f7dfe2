use std::sync::{
    PoisonError, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::warn;

use crate::{error::SimError, geo::GeoPoint};

type PointCell = RwLock<Option<GeoPoint>>;

fn load(cell: &PointCell) -> Option<GeoPoint> {
    *cell.read().unwrap_or_else(PoisonError::into_inner)
}

fn store(cell: &PointCell, value: Option<GeoPoint>) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// State shared between the input side and the reporting task.
///
/// Every field is independent, last write wins per field. Only the service writes `running`.
///
/// `revision` is bumped by every write from the input side, the movement animator only writes
/// while the revision it planned against is still current.
#[derive(Debug, Default)]
pub struct SimulationState {
    current_position: PointCell,
    destination: PointCell,
    running: AtomicBool,
    revision: AtomicU64,
}

impl SimulationState {
    /// Teleport to a position, this also makes it the destination
    pub fn set_current_position(&self, lat: f64, lng: f64) -> Result<GeoPoint, SimError> {
        let point = GeoPoint::new(lat, lng).inspect_err(|why| warn!("Rejecting position: {why}"))?;
        // Held across the bump so the animator can't slip a write in between
        let mut current = self
            .current_position
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Some(point);
        store(&self.destination, Some(point));
        self.bump_revision();
        Ok(point)
    }

    pub fn set_destination(&self, lat: f64, lng: f64) -> Result<GeoPoint, SimError> {
        let point =
            GeoPoint::new(lat, lng).inspect_err(|why| warn!("Rejecting destination: {why}"))?;
        store(&self.destination, Some(point));
        self.bump_revision();
        Ok(point)
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Changes whenever the input side sets a position or destination
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Move the current position while keeping the destination, used by the movement animator.
    /// Does nothing and returns `false` if anything was set since `revision`.
    pub(crate) fn advance_current_position(&self, point: GeoPoint, revision: u64) -> bool {
        let mut current = self
            .current_position
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.revision() != revision {
            return false;
        }
        *current = Some(point);
        true
    }

    pub fn current_position(&self) -> Option<GeoPoint> {
        load(&self.current_position)
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        load(&self.destination)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Clear both points and mark the simulation as stopped
    pub(crate) fn reset(&self) {
        store(&self.current_position, None);
        store(&self.destination, None);
        self.bump_revision();
        self.set_running(false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_set_and_read_back() {
        let state = SimulationState::default();
        let p = state.set_current_position(39.9, 116.4).unwrap();
        state.set_destination(39.9, 116.4).unwrap();
        assert_eq!(state.current_position(), Some(p));
        assert_eq!(state.destination(), Some(p));
    }

    #[test]
    fn test_current_position_resets_destination() {
        let state = SimulationState::default();
        state.set_destination(10.0, 10.0).unwrap();
        let p = state.set_current_position(20.0, 20.0).unwrap();
        assert_eq!(state.destination(), Some(p));
    }

    #[test]
    fn test_invalid_keeps_previous() {
        let state = SimulationState::default();
        let p = state.set_current_position(1.0, 2.0).unwrap();
        let d = state.set_destination(3.0, 4.0).unwrap();

        assert!(matches!(
            state.set_current_position(95.0, 2.0),
            Err(SimError::InvalidArgument { .. })
        ));
        assert!(state.set_destination(3.0, f64::NAN).is_err());

        assert_eq!(state.current_position(), Some(p));
        assert_eq!(state.destination(), Some(d));
    }

    #[test]
    fn test_reset() {
        let state = SimulationState::default();
        state.set_current_position(1.0, 2.0).unwrap();
        state.set_running(true);
        state.reset();
        assert!(!state.is_running());
        assert_eq!(state.current_position(), None);
        assert_eq!(state.destination(), None);
    }

    #[test]
    fn test_advance_after_teleport_is_refused() {
        let state = SimulationState::default();
        state.set_current_position(1.0, 2.0).unwrap();
        let d = state.set_destination(3.0, 4.0).unwrap();
        let seen = state.revision();

        let step = GeoPoint::new(2.0, 3.0).unwrap();
        assert!(state.advance_current_position(step, seen));
        assert_eq!(state.current_position(), Some(step));
        assert_eq!(state.destination(), Some(d));
        assert_eq!(state.revision(), seen);

        let p = state.set_current_position(3.0, 4.0).unwrap();
        assert_ne!(state.revision(), seen);
        assert!(!state.advance_current_position(step, seen));
        assert_eq!(state.current_position(), Some(p));
    }

    #[test]
    fn test_concurrent_writers_last_write_wins() {
        let state = Arc::new(SimulationState::default());
        let handles = (0..4)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for j in 0..500 {
                        state.set_destination(i as f64, j as f64 / 10.0).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        let last = state.destination().unwrap();
        assert_eq!(last.lng(), 49.9);
        assert!((0.0..4.0).contains(&last.lat()));
    }
}
