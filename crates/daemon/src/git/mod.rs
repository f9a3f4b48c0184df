// Git side of the update pipeline: in-process commit, detached push.

pub mod commit;
pub mod push;
