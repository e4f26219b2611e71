//! Junction routing: which edges a held item may leave through, which lane
//! receives it, and the splitter round-robin order.

use crate::geometry::Edge;
use crate::registry::{DeviceKind, JunctionKind};
use crate::runtime::Lane;

/// Whether an item that came in through `entered_from` may leave through `exit`.
///
/// Splitters and mergers never send an item back out the edge it came from.
/// Bridge lanes only pass straight through.
pub fn may_exit(kind: &DeviceKind, entered_from: Edge, exit: Edge) -> bool {
    match kind {
        DeviceKind::Junction(JunctionKind::Bridge) => exit == entered_from.opposite(),
        DeviceKind::Junction(_) => exit != entered_from,
        _ => true,
    }
}

/// Lane of the receiving device that an item arriving through `to_edge` uses.
pub fn receiving_lane(kind: &DeviceKind, to_edge: Edge) -> Lane {
    match kind {
        DeviceKind::Conveyor => Lane::Slot,
        DeviceKind::Junction(JunctionKind::Bridge) => Lane::for_axis(to_edge.axis()),
        DeviceKind::Junction(_) => Lane::Slot,
        _ => Lane::Output,
    }
}

/// Positions `0..n` starting at `start`, wrapping around.
pub fn round_robin_order(n: usize, start: usize) -> impl Iterator<Item = usize> {
    let start = if n == 0 { 0 } else { start % n };
    (0..n).map(move |i| (start + i) % n)
}

/// Round-robin pointer after sending through position `chosen`.
pub fn next_rr_index(chosen: usize, n: usize) -> usize {
    if n == 0 { 0 } else { (chosen + 1) % n }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_never_returns_to_entry() {
        let splitter = DeviceKind::Junction(JunctionKind::Splitter);
        assert!(!may_exit(&splitter, Edge::West, Edge::West));
        assert!(may_exit(&splitter, Edge::West, Edge::North));
        assert!(may_exit(&splitter, Edge::West, Edge::East));
    }

    #[test]
    fn bridge_passes_straight_through() {
        let bridge = DeviceKind::Junction(JunctionKind::Bridge);
        assert!(may_exit(&bridge, Edge::North, Edge::South));
        assert!(!may_exit(&bridge, Edge::North, Edge::East));
        assert!(may_exit(&bridge, Edge::East, Edge::West));
        assert_eq!(receiving_lane(&bridge, Edge::North), Lane::Ns);
        assert_eq!(receiving_lane(&bridge, Edge::West), Lane::We);
    }

    #[test]
    fn buffers_receive_on_output_lane() {
        assert_eq!(receiving_lane(&DeviceKind::Crafter, Edge::West), Lane::Output);
        assert_eq!(
            receiving_lane(&DeviceKind::Storage { capacity: 1 }, Edge::West),
            Lane::Output
        );
        assert_eq!(receiving_lane(&DeviceKind::Conveyor, Edge::North), Lane::Slot);
    }

    #[test]
    fn round_robin_wraps() {
        assert_eq!(round_robin_order(3, 2).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert_eq!(round_robin_order(3, 5).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert_eq!(round_robin_order(0, 1).count(), 0);
        assert_eq!(next_rr_index(2, 3), 0);
        assert_eq!(next_rr_index(0, 3), 1);
    }
}
