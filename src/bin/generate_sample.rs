use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fringe_pmd::analysis::pmd::C0;
use fringe_pmd::data::loader::write_csv;
use fringe_pmd::Trace;

/// Write synthetic fringe spectra for trying out `fringe-pmd`.
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory; traces are written as 1.csv, 2.csv, ...
    #[arg(long, default_value = "sample_spectra")]
    out_dir: PathBuf,

    /// Number of traces.
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// Differential group delay of the simulated fiber, in ps.
    #[arg(long, default_value_t = 1.0)]
    dgd_ps: f64,

    #[arg(long, default_value_t = 1580.0)]
    lambda_min: f64,

    #[arg(long, default_value_t = 1710.0)]
    lambda_max: f64,

    #[arg(long, default_value_t = 2001)]
    points: usize,

    /// Standard deviation of the additive noise, in dB.
    #[arg(long, default_value_t = 0.05)]
    noise_db: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Seeded noise for reproducible spectra: SplitMix64 uniforms, Gaussian
/// pairs from the Marsaglia polar method.
struct NoiseSource {
    counter: u64,
    spare: Option<f64>,
}

impl NoiseSource {
    const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

    fn new(seed: u64) -> Self {
        NoiseSource {
            counter: seed,
            spare: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(Self::GOLDEN_GAMMA);
        let mut z = self.counter;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Normal sample with the given standard deviation, zero mean.
    fn gaussian(&mut self, std_dev: f64) -> f64 {
        if let Some(z) = self.spare.take() {
            return std_dev * z;
        }
        loop {
            let u = 2.0 * self.uniform() - 1.0;
            let v = 2.0 * self.uniform() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let scale = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * scale);
                return std_dev * u * scale;
            }
        }
    }
}

/// Fixed-analyzer transmission of a fiber with the given DGD, in dB.
///
/// The polarizer output follows `½(1 + V·cos(2π·c·Δτ/λ + φ0))` on top of a
/// gently sloped source envelope; `φ0` plays the role of the scrambler state.
fn fringe_spectrum(args: &Args, phase0: f64, visibility: f64, noise: &mut NoiseSource) -> Trace {
    let n = args.points.max(2);
    let span = args.lambda_max - args.lambda_min;
    let dgd_s = args.dgd_ps * 1e-12;

    let wavelength_nm: Vec<f64> = (0..n)
        .map(|i| args.lambda_min + span * i as f64 / (n - 1) as f64)
        .collect();
    let intensity_db = wavelength_nm
        .iter()
        .map(|&wl| {
            let lam_m = wl * 1e-9;
            let phase = std::f64::consts::TAU * C0 * dgd_s / lam_m + phase0;
            let transmission = 0.5 * (1.0 + visibility * phase.cos()) + 1e-3;
            let envelope = -30.0 - 3.0 * ((wl - args.lambda_min) / span - 0.5).powi(2);
            envelope + 10.0 * transmission.log10() + noise.gaussian(args.noise_db)
        })
        .collect();

    Trace {
        wavelength_nm,
        intensity_db,
        label: None,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut noise = NoiseSource::new(args.seed);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    for k in 1..=args.count {
        let phase0 = noise.uniform() * std::f64::consts::TAU;
        let visibility = 0.8 + 0.19 * noise.uniform();
        let trace = fringe_spectrum(&args, phase0, visibility, &mut noise);

        let path = args.out_dir.join(format!("{k}.csv"));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        write_csv(&trace, BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))?;
    }

    println!(
        "Wrote {} spectra ({} points, {:.2} ps DGD) to {}",
        args.count,
        args.points,
        args.dgd_ps,
        args.out_dir.display()
    );
    Ok(())
}
