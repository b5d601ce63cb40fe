use itertools::Itertools;
use orbsim::system::{BodySnapshot, Snapshot};
use tracing::info;

fn describe(body: &BodySnapshot, bodies: &[BodySnapshot], unit_m: f64) -> String {
    let primary = body
        .primary
        .and_then(|p| bodies.iter().find(|b| b.id == p))
        .map_or("-", |b| b.name.as_str());
    let r = body.state.position;
    let mut line = format!(
        "{:<8} around {:<8} {:?} r=({:+.6e}, {:+.6e}, {:+.6e})",
        body.name, primary, body.regime, r.x, r.y, r.z
    );
    if let Some(el) = body.elements {
        line += &format!(" e={:.6} i={:.3}°", el.e, el.i.to_degrees());
    }
    if let Some(mass) = body.mass {
        line += &format!(
            " m={mass:.1} kg |v|={:.1} m/s",
            body.state.velocity.norm() * unit_m
        );
    }
    line
}

/// Log one line per ship, or per body when `all` is set. `unit_m` is the
/// length unit in metres.
pub fn log(snapshot: &Snapshot, all: bool, unit_m: f64) {
    let epoch = snapshot
        .epoch
        .map_or_else(|| "uninitialized".to_owned(), |e| e.to_string());
    let lines = snapshot
        .bodies
        .iter()
        .filter(|b| all || b.mass.is_some())
        .map(|b| describe(b, &snapshot.bodies, unit_m))
        .join("\n  ");
    info!("{epoch}\n  {lines}");
}
