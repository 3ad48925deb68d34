//! Run every LPC method over a WAV file and print a per-method summary.
//!
//! Usage: cargo run --example analyze_wav -- path/to/audio.wav

use praatfan_lpc::{Lpc, Sound, WindowShape};

fn summarize(name: &str, lpc: &Lpc) {
    let n = lpc.n_frames();
    let mean_gain: f64 = lpc.gain_values().iter().sum::<f64>() / n as f64;
    let full_order = lpc
        .frames()
        .iter()
        .filter(|f| f.order() == lpc.max_coefficients())
        .count();
    println!(
        "  {name:<16} {n} frames, {} flagged, {full_order} at full order, mean gain {mean_gain:.6}",
        lpc.n_flagged_frames()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: analyze_wav <file.wav>");

    // Load sound - try mono first, then extract channel 0 if stereo.
    let sound = match Sound::from_file(&path) {
        Ok(s) => s,
        Err(praatfan_lpc::Error::NotMono(channels)) => {
            println!("(Stereo file with {channels} channels, extracting channel 0)");
            Sound::from_file_channel(&path, 0)?
        }
        Err(e) => return Err(e.into()),
    };
    println!("{sound}");

    let order = 16;
    let width = 0.025;
    let step = 0.005;
    let pre_emphasis = 50.0;
    let shape = WindowShape::Gaussian2;

    print!("  Autocorrelation... ");
    let lpc = sound.to_lpc_autocorrelation(order, width, step, pre_emphasis, shape)?;
    println!("OK");
    summarize("autocorrelation", &lpc);

    print!("  Covariance... ");
    let lpc = sound.to_lpc_covariance(order, width, step, pre_emphasis, shape)?;
    println!("OK");
    summarize("covariance", &lpc);

    print!("  Burg... ");
    let lpc = sound.to_lpc_burg(order, width, step, pre_emphasis, shape)?;
    println!("OK");
    summarize("burg", &lpc);

    print!("  Marple... ");
    let lpc = sound.to_lpc_marple(order, width, step, pre_emphasis, shape, 1e-6, 1e-6)?;
    println!("OK");
    summarize("marple", &lpc);

    print!("  Robust... ");
    let lpc = sound.to_lpc_robust(order, width, step, pre_emphasis, shape, 1.5, 25, 1e-6, 0.0, false)?;
    println!("OK");
    summarize("robust", &lpc);

    Ok(())
}
