/// Input limits of the TabPFN prior-fitted network. A single in-context fit
/// never sees more than these.
pub struct TabPfnConstants;

impl TabPfnConstants {
    pub const MAX_INP_SIZE: usize = 1000;
    pub const MAX_FEAT_SIZE: usize = 100;
    pub const MAX_CLASSES: usize = 10;
}
