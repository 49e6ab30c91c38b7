use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, eyre};

use abdd_rs::automaton::Automaton;
use abdd_rs::boxes::{box_order, BoxCatalogue, BOX_ORDERS};
use abdd_rs::eval::{equivalent, sat_count, MAX_EVAL_VARS};
use abdd_rs::fold::fold;
use abdd_rs::normalize::normalize;
use abdd_rs::unfold::unfold;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Family {
    /// x1 AND x2 AND ... AND xn
    And,
    /// x1 OR x2 OR ... OR xn
    Or,
    /// x1 XOR x2 XOR ... XOR xn
    Parity,
    /// At least half of the variables are true
    Majority,
    /// x1 AND xn (the middle variables are don't-cares)
    Ends,
}

impl Family {
    fn eval(self, v: &[bool]) -> bool {
        match self {
            Family::And => v.iter().all(|&b| b),
            Family::Or => v.iter().any(|&b| b),
            Family::Parity => v.iter().filter(|&&b| b).count() % 2 == 1,
            Family::Majority => 2 * v.iter().filter(|&&b| b).count() >= v.len(),
            Family::Ends => v.first().copied().unwrap_or(false) && v.last().copied().unwrap_or(false),
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Function family.
    #[arg(value_enum, default_value = "ends")]
    family: Family,

    /// Number of variables.
    #[clap(short, long, value_name = "INT", default_value = "4")]
    vars: u32,

    /// Box order name.
    #[clap(long, value_name = "NAME", default_value = "bdd")]
    order: String,

    /// Print the automaton after every stage.
    #[clap(long)]
    verbose: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    if args.vars > MAX_EVAL_VARS {
        bail!("too many variables for a truth table: {} (limit is {})", args.vars, MAX_EVAL_VARS);
    }
    let order = box_order(&args.order).ok_or_else(|| {
        let known: Vec<&str> = BOX_ORDERS.iter().map(|(name, _)| *name).collect();
        eyre!("unknown box order '{}', expected one of {:?}", args.order, known)
    })?;

    let catalogue = BoxCatalogue::standard();
    let n = args.vars;
    let family = args.family;
    let tree = Automaton::from_truth_table(n, |v| family.eval(v));
    report("input", &tree, args.verbose);

    let unfolded = unfold(&tree, &catalogue, n)?;
    report("unfolded", &unfolded, args.verbose);

    let normalized = normalize(&unfolded, n)?;
    report("normalized", &normalized, args.verbose);

    let folded = fold(&normalized, &catalogue, order, n)?.renumbered();
    report(&format!("folded with {:?}", order), &folded, true);

    let same = equivalent(&tree, &folded, &catalogue, n)?;
    println!("equivalent to input: {}", same);
    println!("models: {}", sat_count(&folded, &catalogue, n)?);

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    if !same {
        bail!("canonical form differs from the input");
    }
    Ok(())
}

fn report(stage: &str, aut: &Automaton, show: bool) {
    println!("{}: {} states, {} transitions", stage, aut.num_states(), aut.num_transitions());
    if show {
        print!("{}", aut);
    }
}
