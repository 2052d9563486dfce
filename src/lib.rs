use std::sync::Arc;

pub mod belt;
pub mod clock;
pub mod config;
pub mod db;
pub mod desk;
pub mod directory;
pub mod ledger;
pub mod models;
pub mod progression;
pub mod report;
pub mod store;
pub mod telemetry;

use clock::{Clock, DayZone};
use desk::CheckInDesk;
use directory::StoreDirectory;
use ledger::AttendanceLedger;
use progression::ProgressionCalculator;
use store::DocumentStore;

#[derive(Clone)]
pub struct Academy {
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<StoreDirectory>,
    pub ledger: AttendanceLedger,
    pub progression: ProgressionCalculator,
    pub desk: CheckInDesk,
}

impl Academy {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, zone: DayZone) -> Self {
        let directory = Arc::new(StoreDirectory::new(store.clone()));
        let ledger = AttendanceLedger::new(store.clone(), directory.clone(), clock.clone(), zone);
        let progression = ProgressionCalculator::new(store.clone(), ledger.clone(), clock.clone());
        let desk = CheckInDesk::new(ledger.clone(), progression.clone(), directory.clone());
        Self {
            store,
            clock,
            directory,
            ledger,
            progression,
            desk,
        }
    }
}
