use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::OffsetDateTime;

use dealcast_rs::{
    DealDraft, DealStatus, Month, create_bdm, create_deal, create_manufacturer, create_reseller,
    initialize_db,
};

/// A utility for creating a test database for the dealcast_rs server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating manufacturers, resellers, and BDMs...");

    let manufacturers: Vec<i64> = [
        "F5",
        "Infoblox",
        "Extreme Networks",
        "Palo Alto Networks",
        "Zscaler",
        "Vectra AI",
    ]
    .into_iter()
    .map(|name| create_manufacturer(name, &conn).map(|manufacturer| manufacturer.id))
    .collect::<Result<_, _>>()?;

    let resellers: Vec<i64> = [
        "Dustin",
        "Netnordic",
        "ATEA",
        "Ingram Micro",
        "Tech Data",
        "Arrow Electronics",
        "Westcon-Comstor",
    ]
    .into_iter()
    .map(|name| create_reseller(name, &conn).map(|reseller| reseller.id))
    .collect::<Result<_, _>>()?;

    let bdms: Vec<i64> = [
        "Anna Lindqvist",
        "Erik Johansson",
        "Maria Bergström",
        "Johan Nilsson",
    ]
    .into_iter()
    .map(|name| create_bdm(name, &conn).map(|bdm| bdm.id))
    .collect::<Result<_, _>>()?;

    println!("Creating deals...");

    let current_month = Month::containing(OffsetDateTime::now_utc().date());

    let end_customers = [
        "Volvo AB",
        "Ericsson",
        "H&M",
        "Spotify",
        "Scania",
        "SEB",
        "Telia",
        "IKEA",
        "Vattenfall",
        "Klarna",
        "Electrolux",
        "Sandvik",
    ];

    // Spread deals over the surrounding year with probabilities that roughly
    // follow the sales stage, including a few closed ones in past months.
    let deal_specs: [(f64, f64, f64, DealStatus, i32); 12] = [
        (120_000.0, 0.18, 0.95, DealStatus::Verbal, 0),
        (85_000.0, 0.22, 0.80, DealStatus::Verbal, 1),
        (240_000.0, 0.15, 0.75, DealStatus::Proposal, 1),
        (60_000.0, 0.25, 0.50, DealStatus::Proposal, 2),
        (45_000.0, 0.30, 0.40, DealStatus::Qualified, 2),
        (150_000.0, 0.20, 0.30, DealStatus::Qualified, 3),
        (30_000.0, 0.35, 0.20, DealStatus::Prospect, 4),
        (500_000.0, 0.12, 0.10, DealStatus::Prospect, 6),
        (95_000.0, 0.28, 0.90, DealStatus::Proposal, 0),
        (70_000.0, 0.24, 1.0, DealStatus::Won, -1),
        (110_000.0, 0.19, 1.0, DealStatus::Won, -2),
        (55_000.0, 0.26, 0.0, DealStatus::Lost, -1),
    ];

    for (index, (sell_usd, margin_pct, probability, status, month_offset)) in
        deal_specs.into_iter().enumerate()
    {
        let draft = DealDraft {
            manufacturer_id: manufacturers[index % manufacturers.len()],
            reseller_id: resellers[index % resellers.len()],
            end_customer: end_customers[index % end_customers.len()].to_string(),
            bdm_id: (index % 3 != 0).then(|| bdms[index % bdms.len()]),
            sell_usd,
            margin_pct,
            probability,
            status,
            expected_close_month: shift_month(current_month, month_offset)?,
            notes: (index % 4 == 0).then(|| "Renewal of last year's order.".to_string()),
        };

        create_deal(draft, &conn)?;
    }

    println!("Success!");

    Ok(())
}

/// The month `offset` months after `base` (or before, for negative offsets).
fn shift_month(base: Month, offset: i32) -> Result<Month, dealcast_rs::Error> {
    let zero_based = base.year() * 12 + i32::from(base.month()) - 1 + offset;

    Month::new(zero_based.div_euclid(12), (zero_based.rem_euclid(12) + 1) as u8)
}
