//! Scenario B — interference, slow path.  R0 and R1 simultaneously propose different values
//! for the same key.  Every replica must commit "k" exactly once, and all must agree on which
//! of the two proposed values won.

mod support;

use support::{drain_and_deliver, make_engines};

const SET: u8 = 1;

#[test]
fn interference_converges_on_a_single_value() {
    let engines = make_engines(3);
    engines[0].run_command(SET, b"k", b"from-r0").unwrap();
    engines[1].run_command(SET, b"k", b"from-r1").unwrap();
    drain_and_deliver(&engines);

    let mut winners = Vec::new();
    for e in &engines {
        let committed = e.callbacks().committed.lock().unwrap();
        assert_eq!(committed.len(), 1, "key \"k\" must commit exactly once per replica");
        winners.push(committed.last().unwrap().clone());
    }
    for w in &winners {
        assert_eq!(w, &winners[0], "all replicas must agree on the committed value");
        assert_eq!(w.0, SET);
        assert_eq!(w.1, b"k".to_vec());
        assert!(w.2 == b"from-r0".to_vec() || w.2 == b"from-r1".to_vec());
    }
}
