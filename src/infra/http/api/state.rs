use std::sync::Arc;

use crate::application::{
    comments::CommentService, posts::PostWriteService, uploads::UploadService,
};
use crate::cache::PageCacheState;

#[derive(Clone)]
pub struct ApiState {
    pub posts: Arc<PostWriteService>,
    pub comments: Arc<CommentService>,
    pub uploads: Arc<UploadService>,
    pub cache: PageCacheState,
}
