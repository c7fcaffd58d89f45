use crate::data::model::{LbicImage, Observable};
use crate::error::ObservableError;
use crate::processing::processor::{Derivation, ObservableProcessor};

/// Processor over one LBIC map. Only raw names resolve.
pub type LbicProcessor = ObservableProcessor<LbicObservable>;

/// LBIC maps have no derived observables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LbicObservable {}

impl Derivation for LbicObservable {
    type Source = LbicImage;
    type Settings = ();

    const ALL: &'static [Self] = &[];

    fn name(self) -> &'static str {
        match self {}
    }

    fn derive(self, _p: &LbicProcessor) -> Result<Observable, ObservableError> {
        match self {}
    }
}
