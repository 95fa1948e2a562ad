pub mod paging;
pub mod phys;

pub fn init() {
    paging::init();
    phys::init();
}
