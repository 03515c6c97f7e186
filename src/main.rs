use std::io;
use std::io::prelude::*;
use std::str::FromStr;

use ndarray::prelude::*;
use nom::{
    character::complete::{char, digit1, space0},
    combinator::{map_res, opt, recognize},
    sequence::{preceded, separated_pair, tuple},
    IResult,
};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

/// One hailstone: a starting position and a constant velocity, both
/// integer-valued in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hail {
    px: i64,
    py: i64,
    pz: i64,
    vx: i64,
    vy: i64,
    vz: i64,
}

fn i64_parser(input: &str) -> IResult<&str, i64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1))),
        FromStr::from_str)(input)
}

fn parse_triple(input: &str) -> IResult<&str, (i64, i64, i64)> {
    tuple((
	i64_parser,
	preceded(tuple((char(','), space0)), i64_parser),
	preceded(tuple((char(','), space0)), i64_parser),
    ))(input)
}

// The input pads columns with spaces ("19, 13, 30 @ -2,  1, -2"), so
// the separators accept any run of spaces.
fn parse_hail(input: &str) -> IResult<&str, ((i64, i64, i64), (i64, i64, i64))> {
    separated_pair(
	parse_triple,
	tuple((space0, char('@'), space0)),
	parse_triple)(input)
}

impl TryFrom<&str> for Hail {
    type Error = String;
    fn try_from(s: &str) -> Result<Hail, String> {
	match parse_hail(s.trim()) {
	    Ok((unparsed, ((px, py, pz), (vx, vy, vz)))) => {
		if unparsed.is_empty() {
		    Ok(Hail { px, py, pz, vx, vy, vz })
		} else {
		    Err(format!("unexpected trailing junk: '{}'", unparsed))
		}
	    }
	    Err(e) => {
		Err(format!("failed to parse '{}': {}", s, e))
	    }
	}
    }
}

fn parse_input(lines: &[&str]) -> Result<Vec<Hail>, String> {
    lines
	.iter()
	.enumerate()
	.filter(|(_, line)| !line.trim().is_empty())
	.map(|(n, line)| {
	    Hail::try_from(*line).map_err(|e| format!("line {}: {}", n + 1, e))
	})
	.collect()
}

/// The closed square in the XY plane within which part 1 counts
/// crossings.  Passed in explicitly so that the tests can run against
/// the small reference area without touching the puzzle bounds.
#[derive(Debug, Clone, Copy)]
struct SearchArea {
    low: f64,
    high: f64,
}

impl SearchArea {
    fn contains(&self, x: f64, y: f64) -> bool {
	self.low <= x && x <= self.high && self.low <= y && y <= self.high
    }
}

const PUZZLE_AREA: SearchArea = SearchArea {
    low: 200_000_000_000_000.0,
    high: 400_000_000_000_000.0,
};

impl Hail {
    /// Where the XY projections of two trajectories cross, if they
    /// cross at a strictly positive time on both.  We solve
    ///
    ///   [ a.vx  -b.vx ] [ta]   [ b.px - a.px ]
    ///   [ a.vy  -b.vy ] [tb] = [ b.py - a.py ]
    ///
    /// by Cramer's rule.  The determinant is computed in exact integer
    /// arithmetic (all velocities are integers), so "parallel" is an
    /// exact zero test rather than an epsilon comparison.
    fn intersect_xy(&self, other: &Hail) -> Option<(f64, f64)> {
	let det = self.vx * (-other.vy) - (-other.vx) * self.vy;
	if det == 0 {
	    return None;	// parallel in XY
	}
	let bx = other.px - self.px;
	let by = other.py - self.py;
	let ta = (bx * (-other.vy) - (-other.vx) * by) as f64 / det as f64;
	let tb = (self.vx * by - self.vy * bx) as f64 / det as f64;
	if ta > 0.0 && tb > 0.0 {
	    Some((
		self.px as f64 + ta * self.vx as f64,
		self.py as f64 + ta * self.vy as f64,
	    ))
	} else {
	    None		// crossed in the past, or at t=0
	}
    }
}

fn count_crossings(hails: &[Hail], area: &SearchArea) -> usize {
    let mut count = 0;
    for i in 0..hails.len() {
	// j starts past i: each unordered pair once, never a
	// hailstone against itself.
	for j in (i + 1)..hails.len() {
	    if let Some((x, y)) = hails[i].intersect_xy(&hails[j]) {
		event!(
		    Level::TRACE,
		    "hailstones {} and {} cross at ({}, {})",
		    i, j, x, y,
		);
		if area.contains(x, y) {
		    count += 1;
		}
	    }
	}
    }
    count
}

/// Two time-free constraints tie the rock (PX,PY,PZ,VX,VY,VZ) to each
/// hailstone h:
///
///   (h.px - PX)(VY - h.vy) = (h.py - PY)(VX - h.vx)
///   (h.px - PX)(VZ - h.vz) = (h.pz - PZ)(VX - h.vx)
///
/// The bilinear terms (PX*VY - PY*VX, and PX*VZ - PZ*VX) are the same
/// for every hailstone, so subtracting the constraints of two
/// hailstones leaves an equation that is linear in the six unknowns.
/// Pairing hailstone 0 with hailstones 1, 2 and 3 gives a square 6x6
/// system with unknowns ordered PX, PY, PZ, VX, VY, VZ.
fn rock_system(hails: &[Hail]) -> Result<(Array2<f64>, Array1<f64>), String> {
    if hails.len() < 4 {
	return Err(format!(
	    "need at least 4 hailstones to determine the rock, got {}",
	    hails.len()
	));
    }
    let mut a = Array2::<f64>::zeros((6, 6));
    let mut b = Array1::<f64>::zeros(6);
    let h0 = &hails[0];
    for (pair, hj) in hails[1..4].iter().enumerate() {
	let r = pair * 2;
	// XY plane: involves PX, PY, VX, VY.
	a[(r, 0)] = (h0.vy - hj.vy) as f64;
	a[(r, 1)] = (hj.vx - h0.vx) as f64;
	a[(r, 3)] = (hj.py - h0.py) as f64;
	a[(r, 4)] = (h0.px - hj.px) as f64;
	b[r] = (h0.px * h0.vy - h0.py * h0.vx - hj.px * hj.vy + hj.py * hj.vx) as f64;
	// XZ plane: involves PX, PZ, VX, VZ.
	a[(r + 1, 0)] = (h0.vz - hj.vz) as f64;
	a[(r + 1, 2)] = (hj.vx - h0.vx) as f64;
	a[(r + 1, 3)] = (hj.pz - h0.pz) as f64;
	a[(r + 1, 5)] = (h0.px - hj.px) as f64;
	b[r + 1] = (h0.px * h0.vz - h0.pz * h0.vx - hj.px * hj.vz + hj.pz * hj.vx) as f64;
    }
    Ok((a, b))
}

/// Gaussian elimination with partial pivoting.  Returns None when a
/// pivot vanishes, meaning the rows do not determine a unique
/// solution.
fn gaussian_solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
	let pivot = (col..n)
	    .max_by(|&r, &s| a[(r, col)].abs().total_cmp(&a[(s, col)].abs()))?;
	if a[(pivot, col)] == 0.0 {
	    return None;
	}
	if pivot != col {
	    for k in 0..n {
		a.swap((col, k), (pivot, k));
	    }
	    b.swap(col, pivot);
	}
	for row in (col + 1)..n {
	    let factor = a[(row, col)] / a[(col, col)];
	    if factor == 0.0 {
		continue;
	    }
	    for k in col..n {
		a[(row, k)] -= factor * a[(col, k)];
	    }
	    b[row] -= factor * b[col];
	}
    }
    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
	let mut sum = b[row];
	for k in (row + 1)..n {
	    sum -= a[(row, k)] * x[k];
	}
	x[row] = sum / a[(row, row)];
    }
    Some(x)
}

/// The thrown rock.  The puzzle guarantees an integer position and
/// velocity.
#[derive(Debug, PartialEq, Eq)]
struct Rock {
    px: i64,
    py: i64,
    pz: i64,
    vx: i64,
    vy: i64,
    vz: i64,
}

impl Rock {
    /// Exact check that this rock meets `hail` at a single
    /// non-negative integer time.  128-bit arithmetic so the full-size
    /// puzzle coordinates cannot overflow.
    fn verify(&self, hail: &Hail) -> bool {
	let dp = [
	    (hail.px - self.px) as i128,
	    (hail.py - self.py) as i128,
	    (hail.pz - self.pz) as i128,
	];
	let dv = [
	    (self.vx - hail.vx) as i128,
	    (self.vy - hail.vy) as i128,
	    (self.vz - hail.vz) as i128,
	];
	// dp[axis] == t * dv[axis] must hold on every axis for a
	// single t >= 0.
	let t = match (0..3).find(|&axis| dv[axis] != 0) {
	    Some(axis) => {
		if dp[axis] % dv[axis] != 0 {
		    return false;
		}
		dp[axis] / dv[axis]
	    }
	    // Identical velocities: only a hailstone already at the
	    // rock's starting point is ever hit.
	    None => return dp == [0, 0, 0],
	};
	t >= 0 && (0..3).all(|axis| dp[axis] == t * dv[axis])
    }

    fn position_sum(&self) -> i64 {
	self.px + self.py + self.pz
    }
}

fn solve_rock(hails: &[Hail]) -> Result<Rock, String> {
    let (a, b) = rock_system(hails)?;
    let x = gaussian_solve(a, b).ok_or_else(|| {
	"degenerate hailstone selection: the rock system is singular".to_string()
    })?;
    let rounded: Vec<i64> = x.iter().map(|v| v.round() as i64).collect();
    let rock = Rock {
	px: rounded[0],
	py: rounded[1],
	pz: rounded[2],
	vx: rounded[3],
	vy: rounded[4],
	vz: rounded[5],
    };
    event!(Level::DEBUG, "rock candidate: {:?}", rock);
    // The system was built from four hailstones and solved in floating
    // point; accept the candidate only if it exactly hits all of them.
    if let Some(i) = (0..hails.len()).find(|&i| !rock.verify(&hails[i])) {
	return Err(format!(
	    "candidate rock {:?} does not hit hailstone {} ({:?})",
	    rock, i, hails[i]
	));
    }
    Ok(rock)
}

fn part1(hails: &[Hail], area: &SearchArea) {
    println!("Day 24 part 1: {}", count_crossings(hails, area));
}

fn part2(hails: &[Hail]) -> Result<(), String> {
    let rock = solve_rock(hails)?;
    event!(Level::INFO, "the rock is {:?}", rock);
    println!("Day 24 part 2: {}", rock.position_sum());
    Ok(())
}

fn run() -> Result<(), String> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let lines: Vec<String> = io::BufReader::new(io::stdin())
	.lines()
	.collect::<Result<_, _>>()
	.map_err(|e| format!("failed to read input: {}", e))?;
    let ls: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let hails = parse_input(&ls)?;
    part1(&hails, &PUZZLE_AREA);
    part2(&hails)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
const SAMPLE: &[&str] = &[
    "19, 13, 30 @ -2,  1, -2",
    "18, 19, 22 @ -1, -1, -2",
    "20, 25, 34 @ -2, -2, -4",
    "12, 31, 28 @ -1, -2, -1",
    "20, 19, 15 @  1, -5, -3",
];

#[cfg(test)]
const SAMPLE_AREA: SearchArea = SearchArea { low: 7.0, high: 27.0 };

#[cfg(test)]
fn sample_hails() -> Vec<Hail> {
    parse_input(SAMPLE).expect("valid sample input")
}

#[cfg(test)]
fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
    let d = (actual.0 - expected.0).abs().max((actual.1 - expected.1).abs());
    assert!(d < 1e-9, "got {:?}, wanted {:?}", actual, expected);
}

#[test]
fn test_parse_hail() {
    assert_eq!(
	Hail::try_from("19, 13, 30 @ -2,  1, -2"),
	Ok(Hail { px: 19, py: 13, pz: 30, vx: -2, vy: 1, vz: -2 })
    );
    assert_eq!(
	Hail::try_from("-5, 0, 7 @ 1, 2, 3"),
	Ok(Hail { px: -5, py: 0, pz: 7, vx: 1, vy: 2, vz: 3 })
    );
    assert!(Hail::try_from("19, 13 @ -2, 1, -2").is_err()); // missing field
    assert!(Hail::try_from("19, 13, 30 @ -2, 1, -2 junk").is_err());
    assert!(Hail::try_from("19, 13, 30.5 @ -2, 1, -2").is_err()); // not an integer
    assert!(Hail::try_from("19, 13, 30").is_err()); // no velocity
}

#[test]
fn test_parse_input() {
    let hails = parse_input(SAMPLE).expect("sample input should parse");
    assert_eq!(hails.len(), 5);
    assert_eq!(
	hails[4],
	Hail { px: 20, py: 19, pz: 15, vx: 1, vy: -5, vz: -3 }
    );

    let err = parse_input(&["19, 13, 30 @ -2, 1, -2", "pebble"]).unwrap_err();
    assert!(err.starts_with("line 2:"), "unexpected error: {}", err);
}

#[test]
fn test_intersect_xy() {
    let h = sample_hails();
    // Worked examples from the puzzle statement.
    assert_close(h[0].intersect_xy(&h[1]).unwrap(), (43.0 / 3.0, 46.0 / 3.0));
    assert_close(h[0].intersect_xy(&h[2]).unwrap(), (35.0 / 3.0, 50.0 / 3.0));
    assert_close(h[0].intersect_xy(&h[3]).unwrap(), (6.2, 19.4));
    assert_eq!(h[1].intersect_xy(&h[2]), None); // parallel in XY
    assert_eq!(h[0].intersect_xy(&h[4]), None); // in the past for hailstone 0
    assert_eq!(h[2].intersect_xy(&h[4]), None); // in the past for hailstone 4
}

#[test]
fn test_intersect_xy_symmetry() {
    let h = sample_hails();
    for i in 0..h.len() {
	for j in (i + 1)..h.len() {
	    match (h[i].intersect_xy(&h[j]), h[j].intersect_xy(&h[i])) {
		(Some(p), Some(q)) => assert_close(p, q),
		(None, None) => (),
		(p, q) => {
		    panic!("asymmetric result for {} and {}: {:?} vs {:?}", i, j, p, q);
		}
	    }
	}
    }
}

#[test]
fn test_intersect_xy_rejects_time_zero() {
    // Same starting point, different directions: they "cross" only at
    // t=0, which does not count.
    let a = Hail::try_from("3, 3, 0 @ 1, 0, 0").unwrap();
    let b = Hail::try_from("3, 3, 0 @ 0, 1, 0").unwrap();
    assert_eq!(a.intersect_xy(&b), None);
}

#[test]
fn test_search_area_is_inclusive() {
    let area = SearchArea { low: 7.0, high: 27.0 };
    assert!(area.contains(7.0, 27.0));
    assert!(area.contains(10.0, 10.0));
    assert!(!area.contains(6.9, 10.0));
    assert!(!area.contains(10.0, 27.1));
}

#[test]
fn test_count_crossings_sample() {
    assert_eq!(count_crossings(&sample_hails(), &SAMPLE_AREA), 2);
}

#[test]
fn test_count_crossings_order_independent() {
    let mut hails = sample_hails();
    hails.reverse();
    assert_eq!(count_crossings(&hails, &SAMPLE_AREA), 2);
    hails.swap(0, 2);
    assert_eq!(count_crossings(&hails, &SAMPLE_AREA), 2);
}

#[test]
fn test_gaussian_solve_small() {
    let a = array![[2.0, 1.0], [1.0, 3.0]];
    let b = array![5.0, 10.0];
    let x = gaussian_solve(a, b).expect("system should be solvable");
    assert!((x[0] - 1.0).abs() < 1e-9);
    assert!((x[1] - 3.0).abs() < 1e-9);
}

#[test]
fn test_gaussian_solve_singular() {
    let a = array![[1.0, 2.0], [2.0, 4.0]];
    let b = array![3.0, 6.0];
    assert_eq!(gaussian_solve(a, b), None);
}

#[test]
fn test_solve_rock_sample() {
    let rock = solve_rock(&sample_hails()).expect("sample should have a rock");
    assert_eq!(rock, Rock { px: 24, py: 13, pz: 10, vx: -3, vy: 1, vz: 2 });
    assert_eq!(rock.position_sum(), 47);
}

#[test]
fn test_rock_verify() {
    let hails = sample_hails();
    let rock = Rock { px: 24, py: 13, pz: 10, vx: -3, vy: 1, vz: 2 };
    for hail in &hails {
	assert!(rock.verify(hail), "rock should hit {:?}", hail);
    }
    // A nearby wrong rock must be rejected by at least one hailstone.
    let wrong = Rock { px: 24, py: 13, pz: 11, vx: -3, vy: 1, vz: 2 };
    assert!(hails.iter().any(|h| !wrong.verify(h)));
}

#[test]
fn test_solve_rock_needs_four_hailstones() {
    assert!(solve_rock(&sample_hails()[..3]).is_err());
}

#[test]
fn test_solve_rock_degenerate() {
    // Four copies of the same hailstone give an all-zero system.
    let h = Hail::try_from("19, 13, 30 @ -2, 1, -2").unwrap();
    assert!(solve_rock(&[h; 4]).is_err());
}
